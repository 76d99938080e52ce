use std::error::Error;
use std::str::FromStr;

use crate::data::SparseRowBuf;
use crate::hyper_parameters::FileFormat;

// libsvm:  label idx:value idx:value ...
// libffm:  label field:idx:value field:idx:value ...
// libffm rows get a bias term 0:0:1.0 in front.
pub struct Parser {
    file_format: FileFormat,
}

fn parse_part<T: FromStr>(part: &str, token: &str, line_number: usize) -> Result<T, Box<dyn Error>> {
    match part.parse::<T>() {
        Ok(val) => Ok(val),
        Err(_) => Err(format!("Line {}: can not parse \"{}\" in \"{}\"", line_number, part, token))?,
    }
}

impl Parser {
    pub fn new(file_format: FileFormat) -> Parser {
        Parser { file_format: file_format }
    }

    pub fn get_file_format(&self) -> FileFormat {
        self.file_format
    }

    /// Fills row from one text line. Returns false for a blank line.
    pub fn parse_line(&self, line: &str, line_number: usize, row: &mut SparseRowBuf) -> Result<bool, Box<dyn Error>> {
        row.clear();
        let mut tokens = line.split_whitespace();
        let label = match tokens.next() {
            Some(label) => label,
            None => return Ok(false),
        };
        row.label = parse_part(label, line, line_number)?;

        match self.file_format {
            FileFormat::LibSVM => {
                for token in tokens {
                    let mut parts = token.split(':');
                    match (parts.next(), parts.next(), parts.next()) {
                        (Some(idx), Some(value), None) => {
                            row.push(parse_part(idx, token, line_number)?, parse_part(value, token, line_number)?);
                        },
                        _ => return Err(format!("Line {}: expected idx:value, got \"{}\"", line_number, token))?,
                    }
                }
            },
            FileFormat::LibFFM => {
                row.push_with_field(0, 0, 1.0);
                for token in tokens {
                    let mut parts = token.split(':');
                    match (parts.next(), parts.next(), parts.next(), parts.next()) {
                        (Some(field), Some(idx), Some(value), None) => {
                            row.push_with_field(parse_part(field, token, line_number)?,
                                                parse_part(idx, token, line_number)?,
                                                parse_part(value, token, line_number)?);
                        },
                        _ => return Err(format!("Line {}: expected field:idx:value, got \"{}\"", line_number, token))?,
                    }
                }
            },
        }
        Ok(true)
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_libsvm() {
        let parser = Parser::new(FileFormat::LibSVM);
        let mut row = SparseRowBuf::new();
        assert!(parser.parse_line("1 3:0.5 10:2", 1, &mut row).unwrap());
        assert_eq!(row.label, 1.0);
        assert_eq!(row.indices, vec![3, 10]);
        assert_eq!(row.values, vec![0.5, 2.0]);
        assert!(row.fields.is_empty());

        assert!(parser.parse_line("-1", 2, &mut row).unwrap());
        assert_eq!(row.label, -1.0);
        assert!(row.is_empty());

        assert!(!parser.parse_line("   ", 3, &mut row).unwrap());
    }

    #[test]
    fn test_libffm() {
        let parser = Parser::new(FileFormat::LibFFM);
        let mut row = SparseRowBuf::new();
        assert!(parser.parse_line("0\t1:4:0.25  2:7:1", 1, &mut row).unwrap());
        assert_eq!(row.label, 0.0);
        assert_eq!(row.fields, vec![0, 1, 2]);
        assert_eq!(row.indices, vec![0, 4, 7]);
        assert_eq!(row.values, vec![1.0, 0.25, 1.0]);
    }

    #[test]
    fn test_malformed() {
        let parser = Parser::new(FileFormat::LibSVM);
        let mut row = SparseRowBuf::new();
        assert!(parser.parse_line("x 1:1", 1, &mut row).is_err());
        assert!(parser.parse_line("1 1", 1, &mut row).is_err());
        assert!(parser.parse_line("1 1:2:3", 1, &mut row).is_err());
        assert!(parser.parse_line("1 -4:1", 1, &mut row).is_err());
        let parser = Parser::new(FileFormat::LibFFM);
        assert!(parser.parse_line("1 1:1", 1, &mut row).is_err());
        let err = parser.parse_line("1 1:a:1", 7, &mut row).unwrap_err();
        assert!(err.to_string().contains("Line 7"));
    }
}
