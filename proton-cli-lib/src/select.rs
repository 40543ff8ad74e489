//! Numbered-menu selection, independent of terminal I/O

use thiserror::Error;

/// What an empty answer means for a menu
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmptyInput {
    /// Pick the first candidate
    First,
    /// Cancel the operation
    Cancel,
    /// Not accepted; ask again
    Reject,
}

/// Result of a valid answer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Choice<T> {
    Picked(T),
    Cancelled,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvalidSelection {
    #[error("Please enter a number.")]
    NotANumber,

    #[error("Invalid selection: choose between 1 and {max}.")]
    OutOfRange { max: usize },

    #[error("Nothing to select.")]
    NoCandidates,
}

/// Interpret `input` (1-based) against `candidates`.
///
/// A single candidate is picked without looking at the input.
pub fn select<'a, T>(
    candidates: &'a [T],
    input: &str,
    on_empty: EmptyInput,
) -> Result<Choice<&'a T>, InvalidSelection> {
    if candidates.is_empty() {
        return Err(InvalidSelection::NoCandidates);
    }
    if candidates.len() == 1 {
        return Ok(Choice::Picked(&candidates[0]));
    }

    let input = input.trim();
    if input.is_empty() {
        return match on_empty {
            EmptyInput::First => Ok(Choice::Picked(&candidates[0])),
            EmptyInput::Cancel => Ok(Choice::Cancelled),
            EmptyInput::Reject => Err(InvalidSelection::NotANumber),
        };
    }

    let number: usize = input.parse().map_err(|_| InvalidSelection::NotANumber)?;
    number
        .checked_sub(1)
        .and_then(|idx| candidates.get(idx))
        .map(Choice::Picked)
        .ok_or(InvalidSelection::OutOfRange {
            max: candidates.len(),
        })
}

/// Interpret a yes/no answer; empty input yields `default`.
pub fn parse_confirmation(input: &str, default: bool) -> bool {
    match input.trim().to_lowercase().as_str() {
        "" => default,
        "y" | "yes" => true,
        _ => false,
    }
}
