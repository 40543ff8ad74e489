//! Terminal prompts

use proton_cli_lib::select::{parse_confirmation, select, Choice, EmptyInput};
use std::io::{self, BufRead, IsTerminal, Write};

/// Whether stdin is attached to a terminal
pub fn interactive() -> bool {
    io::stdin().is_terminal()
}

/// Print `prompt` and read one line. `None` on end of input.
pub fn read_line(prompt: &str) -> Option<String> {
    print!("{}", prompt);
    let _ = io::stdout().flush();

    let mut line = String::new();
    match io::stdin().lock().read_line(&mut line) {
        Ok(0) | Err(_) => {
            println!();
            None
        }
        Ok(_) => Some(line.trim().to_string()),
    }
}

/// Ask a yes/no question. End of input counts as "no".
pub fn confirm(question: &str, default: bool) -> bool {
    let hint = if default { "[Y/n]" } else { "[y/N]" };
    read_line(&format!("{} {} ", question, hint))
        .map(|answer| parse_confirmation(&answer, default))
        .unwrap_or(false)
}

/// Numbered menu. Re-prompts until the answer is valid; `None` when cancelled.
pub fn choose<'a, T>(
    title: &str,
    items: &'a [T],
    label: impl Fn(&T) -> String,
    on_empty: EmptyInput,
) -> Option<&'a T> {
    match items {
        [] => return None,
        [only] => {
            println!("Selected {}", label(only));
            return Some(only);
        }
        _ => {}
    }

    println!("\n{}:", title);
    for (i, item) in items.iter().enumerate() {
        println!(" [{}] {}", i + 1, label(item));
    }

    let prompt = match on_empty {
        EmptyInput::First => "\nSelect (number) [Default: 1]: ",
        EmptyInput::Cancel => "\nSelect (number) [Enter to cancel]: ",
        EmptyInput::Reject => "\nSelect (number): ",
    };

    loop {
        let answer = read_line(prompt)?;
        match select(items, &answer, on_empty) {
            Ok(Choice::Picked(item)) => return Some(item),
            Ok(Choice::Cancelled) => return None,
            Err(e) => eprintln!("✖ {}", e),
        }
    }
}
