//! Durable mapping from logical block number to the physical tape block holding its newest data.

use crate::{Error, Result};
use byteorder::{BigEndian, ByteOrder};
use rusqlite::{Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const DEFAULT_NAMESPACE: &str = "tapisk";

/// Last-write-wins store of `block -> location`.
///
/// A miss is reported as [`Error::NotExists`]; it means the block was never written.
pub trait LocationIndex: Send {
    fn set_location(&mut self, block: u64, location: u64) -> Result<()>;
    fn get_location(&self, block: u64) -> Result<u64>;
}

fn encode(value: u64) -> [u8; 8] {
    let mut buf = [0u8; 8];
    BigEndian::write_u64(&mut buf, value);
    buf
}

fn check_namespace(namespace: &str) -> Result<()> {
    let valid = !namespace.is_empty()
        && namespace
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if !valid {
        return Err(Error::InvalidNamespace(namespace.to_string()));
    }
    Ok(())
}

/// Index kept in a SQLite database, one table per namespace.
///
/// Keys and values are 8-byte big-endian integers. Every `set_location` commits on its own.
pub struct SqliteIndex {
    /// SQLite connection
    conn: Connection,
    /// Database file
    path: PathBuf,
    /// Table holding this index, validated by `check_namespace`
    namespace: String,
}

impl SqliteIndex {
    /// Open (or create) the database at `path` and create `namespace` in it if missing.
    pub fn open<P: AsRef<Path>>(path: P, namespace: &str) -> Result<Self> {
        check_namespace(namespace)?;

        let path = path.as_ref();
        let conn = Connection::open(path)?;
        conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS \"{namespace}\"
            (block BLOB PRIMARY KEY NOT NULL, location BLOB NOT NULL) WITHOUT ROWID;"
            ),
            (),
        )?;

        log::debug!("opened index {}, namespace {namespace}", path.display());
        Ok(Self {
            conn,
            path: path.to_path_buf(),
            namespace: namespace.to_string(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Release the database. Dropping the index does the same but swallows the error.
    pub fn close(self) -> Result<()> {
        self.conn.close().map_err(|(_, err)| err.into())
    }

    /// All entries, ordered by block number.
    pub fn entries(&self) -> Result<Vec<(u64, u64)>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT block, location FROM \"{}\" ORDER BY block;",
            self.namespace
        ))?;
        let rows = stmt.query_map((), |row| {
            Ok((row.get::<_, Vec<u8>>(0)?, row.get::<_, Vec<u8>>(1)?))
        })?;

        let mut result = Vec::new();
        for row in rows {
            let (key, value) = row?;
            if key.len() != 8 {
                return Err(Error::CorruptKey(key.len()));
            }
            let block = BigEndian::read_u64(&key);
            if value.len() != 8 {
                return Err(Error::CorruptEntry(block));
            }
            result.push((block, BigEndian::read_u64(&value)));
        }
        Ok(result)
    }
}

impl LocationIndex for SqliteIndex {
    fn set_location(&mut self, block: u64, location: u64) -> Result<()> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "INSERT INTO \"{}\" (block, location) VALUES (?1, ?2)
            ON CONFLICT (block) DO UPDATE SET location = excluded.location;",
            self.namespace
        ))?;
        stmt.execute((&encode(block)[..], &encode(location)[..]))
            .map(|_| ())
            .map_err(Into::into)
    }

    fn get_location(&self, block: u64) -> Result<u64> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT location FROM \"{}\" WHERE block = ?1;",
            self.namespace
        ))?;
        let value: Option<Vec<u8>> = stmt
            .query_row([&encode(block)[..]], |row| row.get(0))
            .optional()?;

        match value {
            None => Err(Error::NotExists),
            Some(value) if value.len() == 8 => Ok(BigEndian::read_u64(&value)),
            Some(_) => Err(Error::CorruptEntry(block)),
        }
    }
}

/// Index that lives and dies with the process.
#[derive(Debug, Default)]
pub struct MemoryIndex {
    map: BTreeMap<u64, u64>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl LocationIndex for MemoryIndex {
    fn set_location(&mut self, block: u64, location: u64) -> Result<()> {
        self.map.insert(block, location);
        Ok(())
    }

    fn get_location(&self, block: u64) -> Result<u64> {
        self.map.get(&block).copied().ok_or(Error::NotExists)
    }
}
