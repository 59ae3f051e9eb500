//! Columnar binary container.
//!
//! A file holds an optional opaque header followed by one block per field.
//! Each block stores all rows of its field back to back, little-endian, so a
//! file with fields `Position[3]` and `Velocity[3]` of `f8` holds every
//! position first and every velocity after it.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use lss_core::{Column, ColumnDescr, ErrorInfo, LssError};

/// Layout overrides for [`BinaryFile::open`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BinaryOptions {
    /// Bytes to skip at the start of the file.
    pub header_size: u64,
    /// Number of rows; inferred from the file length when absent.
    pub size: Option<usize>,
    /// Absolute byte offset of each field block. When given it must name
    /// every field; otherwise blocks follow the header in field order.
    pub offsets: Option<BTreeMap<String, u64>>,
}

#[derive(Debug, Clone)]
struct Field {
    name: String,
    descr: ColumnDescr,
    offset: u64,
}

/// A validated view of a columnar binary file.
///
/// The layout is checked against the file length when the view is created;
/// the file itself is only opened on the first read.
#[derive(Debug)]
pub struct BinaryFile {
    path: PathBuf,
    fields: Vec<Field>,
    size: usize,
    handle: Mutex<Option<File>>,
}

fn layout_error(code: &str, message: impl Into<String>, path: &Path) -> LssError {
    LssError::Shape(ErrorInfo::new(code, message).with_context("path", path.display().to_string()))
}

// Byte length of a field block; `None` when it does not fit in a u64.
fn block_bytes(descr: &ColumnDescr, size: usize) -> Option<u64> {
    u64::try_from(descr.row_bytes())
        .ok()?
        .checked_mul(u64::try_from(size).ok()?)
}

fn size_error(path: &Path, size: usize) -> LssError {
    LssError::Shape(
        ErrorInfo::new("binary-size", "row count overflows the addressable file length")
            .with_context("path", path.display().to_string())
            .with_context("size", size.to_string())
            .with_hint("check -size against the file"),
    )
}

impl BinaryFile {
    /// Validates the layout of `path` against `fields` and `options`.
    pub fn open(
        path: impl Into<PathBuf>,
        fields: &[(String, ColumnDescr)],
        options: &BinaryOptions,
    ) -> Result<Self, LssError> {
        let path = path.into();
        if fields.is_empty() {
            return Err(layout_error("binary-no-fields", "binary layout has no fields", &path));
        }
        let row_bytes: usize = fields.iter().map(|(_, descr)| descr.row_bytes()).sum();
        if row_bytes == 0 {
            return Err(layout_error("binary-empty-row", "binary layout has zero-width rows", &path));
        }
        let file_len = fs::metadata(&path)
            .map_err(|err| LssError::io("binary-stat", path.display(), err))?
            .len();
        if options.header_size > file_len {
            return Err(LssError::Shape(
                ErrorInfo::new("binary-header", "header is larger than the file")
                    .with_context("path", path.display().to_string())
                    .with_context("header_size", options.header_size.to_string())
                    .with_context("file_len", file_len.to_string()),
            ));
        }

        let size = match options.size {
            Some(size) => size,
            None => {
                let data = file_len - options.header_size;
                if data % row_bytes as u64 != 0 {
                    return Err(LssError::Shape(
                        ErrorInfo::new(
                            "binary-size-infer",
                            "file length is not a whole number of rows",
                        )
                        .with_context("path", path.display().to_string())
                        .with_context("data_bytes", data.to_string())
                        .with_context("row_bytes", row_bytes.to_string())
                        .with_hint("check the header size and the column layout"),
                    ));
                }
                (data / row_bytes as u64) as usize
            }
        };

        let offsets = match &options.offsets {
            Some(explicit) => {
                for name in explicit.keys() {
                    if !fields.iter().any(|(field, _)| field == name) {
                        return Err(layout_error(
                            "binary-offsets-unknown",
                            format!("offset given for unknown field '{name}'"),
                            &path,
                        ));
                    }
                }
                fields
                    .iter()
                    .map(|(name, _)| {
                        explicit.get(name).copied().ok_or_else(|| {
                            layout_error(
                                "binary-offsets-missing",
                                format!("no offset given for field '{name}'"),
                                &path,
                            )
                        })
                    })
                    .collect::<Result<Vec<u64>, LssError>>()?
            }
            None => {
                let mut next = options.header_size;
                fields
                    .iter()
                    .map(|(_, descr)| {
                        let offset = next;
                        next = block_bytes(descr, size)
                            .and_then(|bytes| next.checked_add(bytes))
                            .ok_or_else(|| size_error(&path, size))?;
                        Ok(offset)
                    })
                    .collect::<Result<Vec<u64>, LssError>>()?
            }
        };

        let fields: Vec<Field> = fields
            .iter()
            .zip(offsets)
            .map(|((name, descr), offset)| Field {
                name: name.clone(),
                descr: descr.clone(),
                offset,
            })
            .collect();
        for field in &fields {
            let end = block_bytes(&field.descr, size)
                .and_then(|bytes| field.offset.checked_add(bytes))
                .ok_or_else(|| size_error(&path, size))?;
            if end > file_len {
                return Err(LssError::Shape(
                    ErrorInfo::new("binary-truncated", "field extends past the end of the file")
                        .with_context("path", path.display().to_string())
                        .with_context("field", field.name.clone())
                        .with_context("end", end.to_string())
                        .with_context("file_len", file_len.to_string()),
                ));
            }
        }

        tracing::info!(path = %path.display(), size, fields = fields.len(), "opened binary file");
        Ok(Self {
            path,
            fields,
            size,
            handle: Mutex::new(None),
        })
    }

    /// Path of the underlying file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of rows.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Field names and descriptors, in layout order.
    pub fn fields(&self) -> Vec<(String, ColumnDescr)> {
        self.fields
            .iter()
            .map(|field| (field.name.clone(), field.descr.clone()))
            .collect()
    }

    /// Reads every row of one field.
    pub fn read(&self, name: &str) -> Result<Column, LssError> {
        self.read_rows(name, 0, self.size)
    }

    /// Reads rows `start..stop` of one field.
    pub fn read_rows(&self, name: &str, start: usize, stop: usize) -> Result<Column, LssError> {
        let field = self.fields.iter().find(|field| field.name == name).ok_or_else(|| {
            LssError::UnknownColumn(
                ErrorInfo::new("binary-field", format!("binary file has no field '{name}'"))
                    .with_context("path", self.path.display().to_string()),
            )
        })?;
        if start > stop || stop > self.size {
            return Err(LssError::Shape(
                ErrorInfo::new("binary-range", "row range out of bounds")
                    .with_context("range", format!("{start}..{stop}"))
                    .with_context("size", self.size.to_string()),
            ));
        }
        let row_bytes = field.descr.row_bytes();
        let mut buffer = vec![0u8; (stop - start) * row_bytes];
        if !buffer.is_empty() {
            let mut guard = self.handle.lock().unwrap_or_else(PoisonError::into_inner);
            if guard.is_none() {
                let file = File::open(&self.path)
                    .map_err(|err| LssError::io("binary-open", self.path.display(), err))?;
                *guard = Some(file);
            }
            if let Some(file) = guard.as_mut() {
                file.seek(SeekFrom::Start(field.offset + (start * row_bytes) as u64))
                    .and_then(|_| file.read_exact(&mut buffer))
                    .map_err(|err| LssError::io("binary-read", self.path.display(), err))?;
            }
        }
        Column::from_le_bytes(&field.descr, stop - start, &buffer)
    }
}

/// Writes `header` followed by one block per column, in the layout read by
/// [`BinaryFile`]. Returns the number of bytes written.
pub fn write_binary(path: &Path, header: &[u8], columns: &[&Column]) -> Result<u64, LssError> {
    if let Some(first) = columns.first() {
        if let Some(other) = columns.iter().find(|column| column.len() != first.len()) {
            return Err(LssError::Shape(
                ErrorInfo::new("binary-write-rows", "columns have different row counts")
                    .with_context("expected", first.len().to_string())
                    .with_context("actual", other.len().to_string()),
            ));
        }
    }
    let file = File::create(path).map_err(|err| LssError::io("binary-create", path.display(), err))?;
    let mut writer = BufWriter::new(file);
    let mut written = header.len() as u64;
    writer
        .write_all(header)
        .map_err(|err| LssError::io("binary-write", path.display(), err))?;
    for column in columns {
        let bytes = column.to_le_bytes();
        written += bytes.len() as u64;
        writer
            .write_all(&bytes)
            .map_err(|err| LssError::io("binary-write", path.display(), err))?;
    }
    writer
        .flush()
        .map_err(|err| LssError::io("binary-write", path.display(), err))?;
    tracing::info!(path = %path.display(), bytes = written, "wrote binary file");
    Ok(written)
}
