use std::fs::File;
use std::io::{self, BufRead, BufReader, Cursor, Seek, SeekFrom};
use std::path::Path;

use bstr::ByteSlice;
use memmap2::{Mmap, MmapOptions};
use tracing::debug;

use crate::error::{ReaderError, Result};
use crate::record::{is_field_whitespace, Record};

const NEWLINE: u8 = b'\n';
const COMMA: u8 = b',';
const QUOTE: u8 = b'"';

/// Reads postal code records from a headed, comma separated source.
///
/// The first line of the source is always treated as a header and skipped,
/// both on open and on every [`RecordReader::restart`].
pub struct RecordReader<R> {
    source: R,
    source_name: String,
    line: Vec<u8>,
    line_number: usize,
    record_count: usize,
}

impl RecordReader<BufReader<File>> {
    pub fn open_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        Self::open(BufReader::new(file), path.display().to_string())
    }
}

impl RecordReader<Cursor<Mmap>> {
    /// Same as [`RecordReader::open_path`] but reads through a memory map.
    pub fn open_mapped(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let mmap = unsafe { MmapOptions::new().map(&file)? };
        Self::open(Cursor::new(mmap), path.display().to_string())
    }
}

impl<R: BufRead + Seek> RecordReader<R> {
    /// Takes ownership of `source` and consumes its header line.
    pub fn open(source: R, source_name: impl Into<String>) -> Result<Self> {
        let mut reader = Self {
            source,
            source_name: source_name.into(),
            line: Vec::new(),
            line_number: 0,
            record_count: 0,
        };
        reader.skip_header()?;
        debug!("Opened {} past its header", reader.source_name);
        Ok(reader)
    }

    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    /// Records returned since the last open or restart.
    pub fn record_count(&self) -> usize {
        self.record_count
    }

    /// Returns the next record, `Ok(None)` at end of input.
    ///
    /// Blank and whitespace-only lines are skipped. A line that does not
    /// split into six fields, or whose code or coordinates fail to convert,
    /// is returned as [`ReaderError::Parse`]; the reader stays usable and
    /// the following call continues with the next line.
    pub fn next_record(&mut self) -> Result<Option<Record>> {
        loop {
            if self.read_line()? == 0 {
                return Ok(None);
            }

            if self.line.trim_with(is_field_whitespace).is_empty() {
                continue;
            }

            let line = self.line.trim_end_with(|c| matches!(c, '\r' | '\n'));
            let fields = split_fields(line);
            return match Record::from_fields(&fields) {
                Ok(record) => {
                    self.record_count += 1;
                    Ok(Some(record))
                }
                Err(reason) => Err(ReaderError::Parse {
                    line_number: self.line_number,
                    line: line.to_str_lossy().into_owned(),
                    reason,
                }),
            };
        }
    }

    /// Seeks back to the first data line.
    pub fn restart(&mut self) -> Result<()> {
        self.source.seek(SeekFrom::Start(0))?;
        self.skip_header()?;
        debug!("Restarted {}", self.source_name);
        Ok(())
    }

    /// Reads every record from the top of the source, then restarts.
    ///
    /// The first rejected line aborts the whole read. The reader is restarted
    /// either way, so a failed read can be retried record by record.
    pub fn read_all(&mut self) -> Result<Vec<Record>> {
        self.restart()?;
        let drained = self.drain();
        self.restart()?;

        let records = drained?;
        debug!("Read {} records from {}", records.len(), self.source_name);
        Ok(records)
    }

    fn drain(&mut self) -> Result<Vec<Record>> {
        let mut records = Vec::new();
        while let Some(record) = self.next_record()? {
            records.push(record);
        }
        Ok(records)
    }

    fn skip_header(&mut self) -> Result<()> {
        self.line_number = 0;
        self.record_count = 0;
        if self.read_line()? == 0 {
            return Err(ReaderError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("{} has no header line", self.source_name),
            )));
        }
        Ok(())
    }

    fn read_line(&mut self) -> io::Result<usize> {
        self.line.clear();
        let read = self.source.read_until(NEWLINE, &mut self.line)?;
        if read > 0 {
            self.line_number += 1;
        }
        Ok(read)
    }
}

impl<R: BufRead + Seek> Iterator for RecordReader<R> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}

/// Splits one line on commas that sit outside double quotes.
///
/// Every `"` toggles the quoted state and is dropped from the output, so a
/// doubled quote is not an escaped literal. Fields are returned untrimmed.
pub fn split_fields(line: &[u8]) -> Vec<String> {
    let mut fields = Vec::with_capacity(6);
    let mut field: Vec<u8> = Vec::new();
    let mut in_quotes = false;

    for &character in line {
        match character {
            QUOTE => in_quotes = !in_quotes,
            COMMA if !in_quotes => {
                fields.push(field.to_str_lossy().into_owned());
                field.clear();
            }
            _ => field.push(character),
        }
    }
    fields.push(field.to_str_lossy().into_owned());

    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ParseFailure;
    use std::io::Read;

    const HEADER: &str = "zip,place,state,county,lat,lon\n";

    fn reader(body: &str) -> RecordReader<Cursor<Vec<u8>>> {
        let data = format!("{HEADER}{body}").into_bytes();
        RecordReader::open(Cursor::new(data), "test").unwrap()
    }

    /// Accepts reads but refuses to seek, like a pipe.
    struct Unseekable(Cursor<Vec<u8>>);

    impl io::Read for Unseekable {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.0.read(buf)
        }
    }

    impl BufRead for Unseekable {
        fn fill_buf(&mut self) -> io::Result<&[u8]> {
            self.0.fill_buf()
        }

        fn consume(&mut self, amt: usize) {
            self.0.consume(amt)
        }
    }

    impl Seek for Unseekable {
        fn seek(&mut self, _pos: SeekFrom) -> io::Result<u64> {
            Err(io::Error::new(io::ErrorKind::Unsupported, "not seekable"))
        }
    }

    #[test]
    fn test_split_fields_plain() {
        assert_eq!(split_fields(b"1,a,b"), vec!["1", "a", "b"]);
        assert_eq!(split_fields(b""), vec![""]);
        assert_eq!(split_fields(b"a,"), vec!["a", ""]);
    }

    #[test]
    fn test_split_fields_quoted_comma() {
        let fields = split_fields(br#"501,"Smith, Town",NY,Suffolk,40.8,-73.0"#);
        assert_eq!(fields.len(), 6);
        assert_eq!(fields[1], "Smith, Town");
    }

    #[test]
    fn test_split_fields_every_quote_toggles() {
        // The doubled quote closes and reopens, so the comma stays literal.
        let fields = split_fields(br#""say ""hi, there""",x"#);
        assert_eq!(fields, vec!["say hi, there", "x"]);
    }

    #[test]
    fn test_split_fields_unbalanced_quote_swallows_rest() {
        let fields = split_fields(br#"1,"open,2,3"#);
        assert_eq!(fields, vec!["1", "open,2,3"]);
    }

    #[test]
    fn test_open_rejects_empty_source() {
        let result = RecordReader::open(Cursor::new(Vec::new()), "empty");
        match result {
            Err(ReaderError::Io(error)) => {
                assert_eq!(error.kind(), io::ErrorKind::UnexpectedEof)
            }
            other => panic!("expected an IO error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_header_only_reads_nothing() {
        let mut reader = reader("");
        assert!(reader.next_record().unwrap().is_none());
        assert!(reader.read_all().unwrap().is_empty());
    }

    #[test]
    fn test_header_without_newline() {
        let mut reader =
            RecordReader::open(Cursor::new(b"zip,place".to_vec()), "test").unwrap();
        assert!(reader.read_all().unwrap().is_empty());
    }

    #[test]
    fn test_skips_blank_lines() {
        let mut body = String::from("\n   \n\t\r\n");
        for _ in 0..10_000 {
            body.push('\n');
        }
        body.push_str("501,Holtsville,NY,Suffolk,40.8154,-73.0451\n\n");

        let mut reader = reader(&body);
        let record = reader.next_record().unwrap().unwrap();
        assert_eq!(record.code, 501);
        assert!(reader.next_record().unwrap().is_none());
        assert_eq!(reader.record_count(), 1);
    }

    #[test]
    fn test_crlf_lines() {
        let mut reader = reader("501,Holtsville,NY,Suffolk,40.8154,-73.0451\r\n");
        let record = reader.next_record().unwrap().unwrap();
        assert_eq!(record.longitude, -73.0451);
    }

    #[test]
    fn test_last_line_without_newline() {
        let mut reader = reader("501,Holtsville,NY,Suffolk,40.8154,-73.0451");
        assert_eq!(reader.read_all().unwrap().len(), 1);
    }

    #[test]
    fn test_parse_error_carries_line() {
        let mut reader = reader("501,Holtsville,NY,Suffolk,40.8154,-73.0451\n\nabc,x,NY,y,1.0,2.0\n");
        assert!(reader.next_record().unwrap().is_some());

        match reader.next_record() {
            Err(ReaderError::Parse { line_number, line, reason }) => {
                assert_eq!(line_number, 4);
                assert_eq!(line, "abc,x,NY,y,1.0,2.0");
                assert_eq!(reason, ParseFailure::InvalidCode("abc".to_string()));
            }
            other => panic!("expected a parse error, got {:?}", other),
        }

        // The reader moves past the bad line.
        assert!(reader.next_record().unwrap().is_none());
    }

    #[test]
    fn test_field_count_errors() {
        let mut five = reader("501,Holtsville,NY,40.8154,-73.0451\n");
        assert!(matches!(
            five.next_record(),
            Err(ReaderError::Parse { reason: ParseFailure::FieldCount { found: 5 }, .. })
        ));

        let mut seven = reader("501,Holtsville,NY,Suffolk,extra,40.8154,-73.0451\n");
        assert!(matches!(
            seven.next_record(),
            Err(ReaderError::Parse { reason: ParseFailure::FieldCount { found: 7 }, .. })
        ));
    }

    #[test]
    fn test_read_all_aborts_on_bad_line() {
        let mut reader = reader(
            "501,Holtsville,NY,Suffolk,40.8154,-73.0451\n\
             502,Broken,NY,Suffolk,forty,-73.0\n\
             503,Fine,NY,Suffolk,40.0,-73.0\n",
        );
        assert!(matches!(reader.read_all(), Err(ReaderError::Parse { .. })));
    }

    #[test]
    fn test_failed_read_all_restarts() {
        let mut reader = reader(
            "1,First,NY,Suffolk,40.0,-73.0\n\
             bad\n\
             3,Third,NY,Suffolk,41.0,-72.0\n",
        );
        assert!(reader.read_all().is_err());
        assert_eq!(reader.record_count(), 0);

        assert_eq!(reader.next_record().unwrap().unwrap().code, 1);
        assert!(reader.next_record().is_err());
        assert_eq!(reader.next_record().unwrap().unwrap().code, 3);
        assert!(reader.next_record().unwrap().is_none());
    }

    #[test]
    fn test_read_all_is_repeatable() {
        let mut reader = reader(
            "501,Holtsville,NY,Suffolk,40.8154,-73.0451\n\
             \"90210\",\"Beverly Hills, City\",CA,Los Angeles,34.09,-118.41\n",
        );
        // Partially consume first; read_all starts from the top regardless.
        reader.next_record().unwrap();

        let first = reader.read_all().unwrap();
        reader.restart().unwrap();
        let second = reader.read_all().unwrap();

        assert_eq!(first.len(), 2);
        assert_eq!(first, second);
        assert_eq!(first[1].place_name, "Beverly Hills, City");
        assert_eq!(reader.record_count(), 0);
    }

    #[test]
    fn test_iterator_yields_results() {
        let reader = reader("1,a,AA,x,1.0,2.0\nbad\n2,b,BB,y,3.0,4.0\n");
        let results: Vec<_> = reader.collect();
        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
        assert_eq!(results[2].as_ref().unwrap().code, 2);
    }

    #[test]
    fn test_restart_requires_seek() {
        let data = format!("{HEADER}1,a,AA,x,1.0,2.0\n").into_bytes();
        let mut reader = RecordReader::open(Unseekable(Cursor::new(data)), "pipe").unwrap();
        assert!(reader.next_record().unwrap().is_some());
        assert!(matches!(reader.restart(), Err(ReaderError::Io(_))));
    }

    #[test]
    fn test_invalid_utf8_is_decoded_lossily() {
        let mut data = HEADER.as_bytes().to_vec();
        data.extend_from_slice(b"1,Caf\xe9,AA,x,1.0,2.0\n");
        let mut reader = RecordReader::open(Cursor::new(data), "latin1").unwrap();
        let record = reader.next_record().unwrap().unwrap();
        assert_eq!(record.place_name, "Caf\u{FFFD}");
    }
}
