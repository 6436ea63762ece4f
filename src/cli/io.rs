//! JSON output for CLI commands
//!
//! One JSON document per line on stdout, UTF-8.

use std::io::{self, Write};

use serde::Serialize;

use super::errors::CliResult;

/// Write `value` as one line of JSON to stdout
pub fn write_json<T: Serialize + ?Sized>(value: &T) -> CliResult<()> {
    let mut stdout = io::stdout();
    write_json_to(&mut stdout, value)?;
    stdout.flush()?;
    Ok(())
}

/// Write `value` as one line of JSON to `out`
pub fn write_json_to<W: Write, T: Serialize + ?Sized>(out: &mut W, value: &T) -> CliResult<()> {
    serde_json::to_writer(&mut *out, value)?;
    writeln!(out)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{DataError, QueryResponse};

    #[test]
    fn test_writes_one_line() {
        let mut out = Vec::new();
        write_json_to(&mut out, &QueryResponse::failure(DataError::MissingTable)).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "{\"data\":null,\"error\":\"Missing table\",\"count\":0}\n"
        );
    }
}
