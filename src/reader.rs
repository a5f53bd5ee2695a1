use std::io::{BufRead, BufReader, Read, Write};
use std::path::Path;

use anyhow::{anyhow, Result};

use crate::parser;
use crate::parser::MetaValue;
use crate::record::{ReadRecord, Variant};
use crate::types::VcfHeader;

/// Iterator over the variants of one VCF source. Multi-allelic records are
/// split into one variant per alternate allele.
pub struct VcfRecords<R: BufRead> {
    header: VcfHeader,
    line_buf: String,
    pending: Vec<Variant>,
    inner: R,
}

impl VcfRecords<BufReader<Box<dyn Read>>> {
    /// Open a VCF file, transparently decompressing gzip.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let (reader, _format) = niffler::from_path(path)?;
        Self::new(BufReader::new(reader))
    }
}

impl<R: BufRead> VcfRecords<R> {
    pub fn new(mut reader: R) -> Result<Self> {
        let mut header = VcfHeader::default();
        let mut line = String::new();
        loop {
            line.clear();
            if reader.read_line(&mut line)? == 0 {
                break;
            }
            let trimmed = line.trim_end();
            if trimmed.starts_with("##") {
                let (_, (key, value)) = parser::meta_entry(trimmed)
                    .map_err(|_| anyhow!("malformed VCF meta line: {}", trimmed))?;
                match value {
                    MetaValue::Info(def) => {
                        header.info.insert(def.id.clone(), def);
                    }
                    MetaValue::Filter(def) => header.filters.push(def),
                    MetaValue::Contig(def) => header.contigs.push(def),
                    MetaValue::Other(value) => header.meta.insert(key.to_owned(), value),
                }
            } else if trimmed.starts_with('#') {
                let (_, columns) = parser::column_line(trimmed)
                    .map_err(|_| anyhow!("malformed VCF column line: {}", trimmed))?;
                header.samples = columns.iter().skip(9).map(|s| s.to_string()).collect();
                break;
            } else if trimmed.is_empty() {
                continue;
            } else {
                return Err(anyhow!(
                    "VCF record before #CHROM header line: {}",
                    trimmed
                ));
            }
        }
        Ok(Self {
            header,
            line_buf: String::new(),
            pending: Vec::new(),
            inner: reader,
        })
    }

    pub fn header(&self) -> &VcfHeader {
        &self.header
    }
}

impl<R: BufRead> Iterator for VcfRecords<R> {
    type Item = Result<Variant>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(variant) = self.pending.pop() {
            return Some(Ok(variant));
        }
        loop {
            self.line_buf.clear();
            match self.inner.read_line(&mut self.line_buf) {
                Ok(0) => return None,
                Ok(_) => {}
                Err(e) => return Some(Err(e.into())),
            }
            let line = self.line_buf.trim_end();
            if line.is_empty() {
                continue;
            }
            let raw = match parser::vcf_record(line) {
                Ok((_, raw)) => raw,
                Err(_) => return Some(Err(anyhow!("malformed VCF record line: {}", line))),
            };
            let info = parser::info_fields(raw.info, &self.header);
            let id = if raw.id == "." {
                None
            } else {
                Some(raw.id.to_owned())
            };
            let filters: Vec<String> = raw.filters.iter().map(|f| f.to_string()).collect();
            let mut variants: Vec<Variant> = raw
                .alt_alleles
                .iter()
                .map(|alt| {
                    Variant::with_details(
                        raw.chrom,
                        raw.pos,
                        raw.ref_allele,
                        alt,
                        id.clone(),
                        raw.qual,
                        filters.clone(),
                        info.clone(),
                    )
                })
                .collect();
            if variants.is_empty() {
                // monomorphic record, nothing to report
                continue;
            }
            variants.reverse();
            self.pending = variants;
            return self.pending.pop().map(Ok);
        }
    }
}

/// Iterator over the reads of one SAM source. Header lines are retained
/// verbatim for round-tripping.
pub struct SamRecords<R: BufRead> {
    header_lines: Vec<String>,
    line_buf: String,
    first_record_line: Option<String>,
    inner: R,
}

impl SamRecords<BufReader<Box<dyn Read>>> {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let (reader, _format) = niffler::from_path(path)?;
        Self::new(BufReader::new(reader))
    }
}

impl<R: BufRead> SamRecords<R> {
    pub fn new(mut reader: R) -> Result<Self> {
        let mut header_lines = Vec::new();
        let mut first_record_line = None;
        let mut line = String::new();
        loop {
            line.clear();
            if reader.read_line(&mut line)? == 0 {
                break;
            }
            let trimmed = line.trim_end();
            if trimmed.starts_with('@') {
                header_lines.push(trimmed.to_owned());
            } else if trimmed.is_empty() {
                continue;
            } else {
                first_record_line = Some(trimmed.to_owned());
                break;
            }
        }
        Ok(Self {
            header_lines,
            line_buf: String::new(),
            first_record_line,
            inner: reader,
        })
    }

    pub fn header_lines(&self) -> &[String] {
        &self.header_lines
    }
}

impl<R: BufRead> Iterator for SamRecords<R> {
    type Item = Result<ReadRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(line) = self.first_record_line.take() {
            return Some(parse_sam_line(&line));
        }
        loop {
            self.line_buf.clear();
            match self.inner.read_line(&mut self.line_buf) {
                Ok(0) => return None,
                Ok(_) => {}
                Err(e) => return Some(Err(e.into())),
            }
            let line = self.line_buf.trim_end();
            if line.is_empty() {
                continue;
            }
            return Some(parse_sam_line(line));
        }
    }
}

fn parse_sam_line(line: &str) -> Result<ReadRecord> {
    parser::sam_record(line)
        .map(|(_, read)| read)
        .map_err(|_| anyhow!("malformed SAM record line: {}", line))
}

/// Re-serialize reads, preserving the source header.
pub fn write_sam<W: Write>(
    mut writer: W,
    header_lines: &[String],
    reads: &[ReadRecord],
) -> Result<()> {
    for line in header_lines {
        writeln!(writer, "{}", line)?;
    }
    for read in reads {
        writeln!(writer, "{}", read.to_sam_line())?;
    }
    Ok(())
}
