use crate::error::FveError;
use crossterm::{
    cursor,
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    style::Print,
    terminal,
};
use secrecy::{Secret, SecretString};
use std::io::{stderr, Write};
use zeroize::Zeroize;

// leaves raw mode on every exit path
struct RawMode;

impl RawMode {
    fn enable() -> Result<Self, FveError> {
        terminal::enable_raw_mode()?;
        Ok(RawMode)
    }
}

impl Drop for RawMode {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
    }
}

/// Reads a password from the terminal, replacing every typed character with a '*' and returning
/// on Enter.
///
/// Supports deleting already entered characters via backspace. Ctrl-C aborts with an
/// `Interrupted` IO error. Does not prompt for input, see [`prompt`].
pub fn read() -> Result<SecretString, FveError> {
    let mut password = String::with_capacity(48);
    {
        let _raw = RawMode::enable()?;
        loop {
            let key = match event::read()? {
                Event::Key(key) if key.kind != KeyEventKind::Release => key,
                _ => continue,
            };
            match key.code {
                KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                    password.zeroize();
                    print_char('\n')?;
                    return Err(std::io::Error::from(std::io::ErrorKind::Interrupted).into());
                }
                KeyCode::Char(c) => {
                    password.push(c);
                    print_char('*')?
                }
                KeyCode::Enter => break,
                KeyCode::Backspace => {
                    if password.pop().is_some() {
                        delete_char()?
                    }
                }
                _ => {}
            }
        }
    }
    print_char('\n')?;

    Ok(Secret::new(password))
}

/// Prints `message` and reads a password with [`read`].
pub fn prompt(message: &str) -> Result<SecretString, FveError> {
    let mut out = stderr();
    write!(out, "{}", message)?;
    out.flush()?;
    read()
}

fn print_char(c: char) -> Result<(), FveError> {
    execute!(stderr(), Print(c))?;
    Ok(())
}

fn delete_char() -> Result<(), FveError> {
    execute!(stderr(), cursor::MoveLeft(1))?;
    print_char(' ')?;
    execute!(stderr(), cursor::MoveLeft(1))?;
    Ok(())
}
