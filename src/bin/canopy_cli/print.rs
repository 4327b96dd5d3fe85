#![deny(clippy::all, clippy::pedantic)]

use std::io::{self, Write};

use serde::Serialize;

use crate::client::CliError;

/// Pretty JSON on stdout, one document per command.
pub fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    write_json(&mut io::stdout().lock(), value)
}

fn write_json<W: Write, T: Serialize>(out: &mut W, value: &T) -> Result<(), CliError> {
    serde_json::to_writer_pretty(&mut *out, value).map_err(CliError::Render)?;
    writeln!(out)?;
    Ok(())
}
