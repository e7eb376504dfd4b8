//! Command-line splitting.
//!
//! Whitespace separates arguments outside quotes. Single and double quotes
//! open a quoted run that only the same character closes, and a backslash
//! takes the next character literally, inside or outside quotes.

use crate::ProcessError;

/// Split `command` into an argv vector.
///
/// An empty quoted run (`''`) produces an empty argument. A backslash at the
/// very end of the input has nothing to escape and is kept as-is.
pub fn tokenize(command: &str) -> Result<Vec<String>, ProcessError> {
    let command = command.trim();
    let mut args = Vec::new();
    let mut current = String::with_capacity(command.len());
    let mut in_arg = false;
    let mut quote: Option<char> = None;
    let mut chars = command.chars();

    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                current.push(chars.next().unwrap_or('\\'));
                in_arg = true;
            }
            '"' | '\'' => match quote {
                None => {
                    quote = Some(c);
                    in_arg = true;
                }
                Some(q) if q == c => quote = None,
                Some(_) => current.push(c),
            },
            c if c.is_whitespace() && quote.is_none() => {
                if in_arg {
                    args.push(std::mem::take(&mut current));
                    in_arg = false;
                }
            }
            c => {
                current.push(c);
                in_arg = true;
            }
        }
    }

    if quote.is_some() {
        return Err(ProcessError::UnclosedQuote);
    }
    if in_arg {
        args.push(current);
    }
    Ok(args)
}

/// Quote one argument so [`tokenize`] reads it back unchanged.
pub fn quote(arg: &str) -> String {
    let mut out = String::with_capacity(arg.len() + 2);
    out.push('\'');
    for c in arg.chars() {
        if c == '\'' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('\'');
    out
}

/// Join an argv into a single command line using [`quote`].
pub fn join<S: AsRef<str>>(argv: &[S]) -> String {
    argv.iter()
        .map(|a| quote(a.as_ref()))
        .collect::<Vec<_>>()
        .join(" ")
}
