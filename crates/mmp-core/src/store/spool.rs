use std::fs::File;
use std::io::{self, BufWriter, Seek, SeekFrom, Write};

/// A row buffer backed by an anonymous temporary file.
///
/// Large blocks are streamed here while they are produced and copied into the
/// output once the header, which needs their row counts, has been written.
pub struct RowSpool {
    file: BufWriter<File>,
    rows: usize,
}

impl RowSpool {
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            file: BufWriter::new(tempfile::tempfile()?),
            rows: 0,
        })
    }

    pub fn push_row(&mut self, row: &str) -> io::Result<()> {
        self.file.write_all(row.as_bytes())?;
        self.file.write_all(b"\n")?;
        self.rows += 1;
        Ok(())
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Copies every spooled row into `out`, consuming the spool.
    pub fn drain_into<W: Write + ?Sized>(self, out: &mut W) -> io::Result<u64> {
        let mut file = self.file.into_inner().map_err(|e| e.into_error())?;
        file.seek(SeekFrom::Start(0))?;
        io::copy(&mut file, out)
    }
}
