use std::error::Error;
use std::fs::File;
use std::io;
use std::io::BufRead;
use std::path::Path;

use flate2::read::MultiGzDecoder;
use zstd::stream::read::Decoder as ZstdDecoder;

use crate::data::{DMatrix, RowArena, SparseRowBuf};
use crate::hyper_parameters::FileFormat;
use crate::parser::Parser;

pub fn create_buffered_input(input_filename: &str) -> Result<Box<dyn BufRead>, Box<dyn Error>> {
    // Handler for different (or no) compression types
    let input = match File::open(input_filename) {
        Ok(f) => f,
        Err(e) => return Err(format!("Could not open the input file {}: {}", input_filename, e))?,
    };

    let input_format = Path::new(&input_filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("");

    match input_format {
        "gz" => {
            let gz_decoder = MultiGzDecoder::new(input);
            Ok(Box::new(io::BufReader::new(gz_decoder)))
        }
        "zst" => {
            let zstd_decoder = ZstdDecoder::new(input)?;
            Ok(Box::new(io::BufReader::new(zstd_decoder)))
        }
        _ => Ok(Box::new(io::BufReader::new(input))),
    }
}

/// Parses every line of the file into a fresh arena.
pub fn read_problem(input_filename: &str, file_format: FileFormat) -> Result<RowArena, Box<dyn Error>> {
    let input = create_buffered_input(input_filename)?;
    let parser = Parser::new(file_format);
    let mut arena = match file_format {
        FileFormat::LibFFM => RowArena::new_with_bias(true),
        FileFormat::LibSVM => RowArena::new(false),
    };
    let mut row = SparseRowBuf::new();
    for (line_number, line) in input.lines().enumerate() {
        let line = line?;
        if parser.parse_line(&line, line_number + 1, &mut row)? {
            arena.push_row(&row);
        }
    }
    log::info!("Read {} rows from {}, max feature index {}, max field {}",
               arena.row_count(), input_filename, arena.max_feature_index(), arena.max_field());
    Ok(arena)
}


/// Keeps a whole data set in memory and hands it out as mini-batches of `batch_size` rows.
/// The last batch of an epoch may be shorter; after it comes one empty batch,
/// then the reader starts over.
pub struct InmemReader {
    arena: RowArena,
    batch_size: usize,
    pos: usize,
}

impl InmemReader {
    pub fn new(input_filename: &str, batch_size: usize, file_format: FileFormat) -> Result<InmemReader, Box<dyn Error>> {
        let arena = read_problem(input_filename, file_format)?;
        if arena.row_count() == 0 {
            return Err(format!("No rows found in {}", input_filename))?;
        }
        Ok(InmemReader::from_arena(arena, batch_size))
    }

    pub fn from_arena(arena: RowArena, batch_size: usize) -> InmemReader {
        assert!(batch_size > 0, "Batch size has to be positive");
        InmemReader {
            arena: arena,
            batch_size: batch_size,
            pos: 0,
        }
    }

    pub fn samples(&mut self) -> DMatrix<'_> {
        let total = self.arena.row_count();
        if self.pos >= total {
            // end of epoch
            self.pos = 0;
            return self.arena.window(total, 0);
        }
        let start = self.pos;
        let mut matrix = self.arena.window(start, total - start);
        matrix.set_length(self.batch_size.min(total - start));
        self.pos += matrix.row_count();
        matrix
    }

    pub fn go_to_head(&mut self) {
        self.pos = 0;
    }

    pub fn arena(&self) -> &RowArena {
        &self.arena
    }

    pub fn into_arena(self) -> RowArena {
        self.arena
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use tempfile::tempdir;

    const LIBSVM: &str = "1 1:0.5 3:1\n\n0 2:2\n1 7:1 1:1\n";

    #[test]
    fn test_read_problem() {
        let dir = tempdir().unwrap();
        let filename = dir.path().join("train.txt");
        File::create(&filename).unwrap().write_all(LIBSVM.as_bytes()).unwrap();
        let arena = read_problem(filename.to_str().unwrap(), FileFormat::LibSVM).unwrap();
        assert_eq!(arena.row_count(), 3);
        assert_eq!(arena.max_feature_index(), 7);
        assert_eq!(arena.row(2).indices, &[7, 1]);
        assert!(!arena.has_fields());
        assert!(!arena.has_bias());
    }

    #[test]
    fn test_gz_input() {
        let dir = tempdir().unwrap();
        let filename = dir.path().join("train.ffm.gz");
        let mut encoder = GzEncoder::new(File::create(&filename).unwrap(), Compression::default());
        encoder.write_all(b"1 1:2:1 2:5:0.5\n0 3:1:1\n").unwrap();
        encoder.finish().unwrap();
        let arena = read_problem(filename.to_str().unwrap(), FileFormat::LibFFM).unwrap();
        assert_eq!(arena.row_count(), 2);
        assert_eq!(arena.max_field(), 3);
        assert_eq!(arena.max_feature_index(), 5);
        assert_eq!(arena.row(1).fields.unwrap(), &[0, 3]);
        assert!(arena.has_bias());
    }

    #[test]
    fn test_bad_input() {
        let dir = tempdir().unwrap();
        assert!(InmemReader::new(dir.path().join("missing.txt").to_str().unwrap(), 2, FileFormat::LibSVM).is_err());

        let filename = dir.path().join("bad.txt");
        File::create(&filename).unwrap().write_all(b"1 1:1\n1 oops\n").unwrap();
        let err = read_problem(filename.to_str().unwrap(), FileFormat::LibSVM).unwrap_err();
        assert!(err.to_string().contains("Line 2"));

        let filename = dir.path().join("empty.txt");
        File::create(&filename).unwrap().write_all(b"\n\n").unwrap();
        assert!(InmemReader::new(filename.to_str().unwrap(), 2, FileFormat::LibSVM).is_err());
    }

    #[test]
    fn test_batches() {
        let mut arena = RowArena::new(false);
        for i in 0..5 {
            arena.push_sparse(i as f32, &[(i, 1.0)]);
        }
        let mut reader = InmemReader::from_arena(arena, 2);
        for _epoch in 0..2 {
            assert_eq!(reader.samples().labels(), &[0.0, 1.0]);
            assert_eq!(reader.samples().labels(), &[2.0, 3.0]);
            assert_eq!(reader.samples().labels(), &[4.0]);
            assert!(reader.samples().is_empty());
        }
        reader.samples();
        reader.go_to_head();
        assert_eq!(reader.samples().labels(), &[0.0, 1.0]);
    }
}
