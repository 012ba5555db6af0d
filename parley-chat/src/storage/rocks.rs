//! RocksDB-backed durable room store.
//!
//! Column families:
//! - `rooms` — participant sets (bincode)
//! - `logs`  — full message logs (LZ4-compressed bincode)
//!
//! A room's log is persisted wholesale: every mutation loads, rewrites
//! and stores the value under the gateway's per-room serialization
//! point, so load-modify-store never interleaves for one room. Keys are
//! the derived room id bytes in both families.

use rocksdb::{
    BlockBasedOptions, Cache, ColumnFamilyDescriptor, DBCompressionType, DBWithThreadMode,
    IteratorMode, Options, SingleThreaded, WriteBatch, WriteOptions,
};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::history::MessageLog;
use crate::protocol::ChatMessage;
use crate::storage::{RoomRecord, RoomStore, StoreError};

const CF_ROOMS: &str = "rooms";
const CF_LOGS: &str = "logs";

const COLUMN_FAMILIES: &[&str] = &[CF_ROOMS, CF_LOGS];

/// Store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Database directory path
    pub path: PathBuf,
    /// Block cache size in bytes (default: 64MB)
    pub block_cache_size: usize,
    /// Bloom filter bits per key (default: 10)
    pub bloom_filter_bits: i32,
    /// Enable fsync on every write (default: false)
    pub sync_writes: bool,
    /// Max open files for RocksDB (default: 256)
    pub max_open_files: i32,
    /// Write buffer size per column family (default: 16MB)
    pub write_buffer_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("parley_data"),
            block_cache_size: 64 * 1024 * 1024,
            bloom_filter_bits: 10,
            sync_writes: false,
            max_open_files: 256,
            write_buffer_size: 16 * 1024 * 1024,
        }
    }
}

impl StoreConfig {
    /// Create config for testing (small caches, temp directory).
    pub fn for_testing(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            block_cache_size: 4 * 1024 * 1024,
            bloom_filter_bits: 10,
            sync_writes: false,
            max_open_files: 64,
            write_buffer_size: 1024 * 1024,
        }
    }
}

/// RocksDB-backed `RoomStore`.
pub struct RocksStore {
    /// RocksDB instance (single-threaded mode — concurrency via tokio)
    db: DBWithThreadMode<SingleThreaded>,
    config: StoreConfig,
}

impl RocksStore {
    /// Open the room store at the configured path.
    ///
    /// Creates the database and column families if they don't exist.
    pub fn open(config: StoreConfig) -> Result<Self, StoreError> {
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        db_opts.set_max_open_files(config.max_open_files);
        db_opts.set_keep_log_file_num(5);
        db_opts.increase_parallelism(num_cpus());

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = COLUMN_FAMILIES
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Self::cf_options(&config)))
            .collect();

        let db = DBWithThreadMode::<SingleThreaded>::open_cf_descriptors(
            &db_opts,
            &config.path,
            cf_descriptors,
        )?;

        Ok(Self { db, config })
    }

    /// Build column family options.
    fn cf_options(config: &StoreConfig) -> Options {
        let mut opts = Options::default();

        let mut block_opts = BlockBasedOptions::default();
        let cache = Cache::new_lru_cache(config.block_cache_size);
        block_opts.set_block_cache(&cache);
        block_opts.set_bloom_filter(config.bloom_filter_bits as f64, false);
        block_opts.set_block_size(16 * 1024);
        opts.set_block_based_table_factory(&block_opts);

        opts.set_compression_type(DBCompressionType::Lz4);
        opts.set_write_buffer_size(config.write_buffer_size);
        // Room lookups are always point reads by room id
        opts.optimize_for_point_lookup(config.block_cache_size as u64);

        opts
    }

    /// List all room ids in the store.
    pub fn list_rooms(&self) -> Result<Vec<String>, StoreError> {
        let cf = self.cf(CF_ROOMS)?;
        let mut room_ids = Vec::new();

        let iter = self.db.iterator_cf(&cf, IteratorMode::Start);
        for item in iter {
            let (key, _) = item.map_err(|e| StoreError::DatabaseError(e.to_string()))?;
            let room_id = String::from_utf8(key.to_vec())
                .map_err(|_| StoreError::DeserializationError("Invalid room id key".into()))?;
            room_ids.push(room_id);
        }

        Ok(room_ids)
    }

    /// Get the database path.
    pub fn path(&self) -> &Path {
        &self.config.path
    }

    // ─── Value codecs ─────────────────────────────────────────────────

    fn encode_participants(participants: &BTreeSet<String>) -> Result<Vec<u8>, StoreError> {
        bincode::serde::encode_to_vec(participants, bincode::config::standard())
            .map_err(|e| StoreError::SerializationError(e.to_string()))
    }

    fn decode_participants(bytes: &[u8]) -> Result<BTreeSet<String>, StoreError> {
        let (participants, _) =
            bincode::serde::decode_from_slice(bytes, bincode::config::standard())
                .map_err(|e| StoreError::DeserializationError(e.to_string()))?;
        Ok(participants)
    }

    fn encode_log(log: &MessageLog) -> Result<Vec<u8>, StoreError> {
        let raw = bincode::serde::encode_to_vec(log, bincode::config::standard())
            .map_err(|e| StoreError::SerializationError(e.to_string()))?;
        Ok(lz4_flex::compress_prepend_size(&raw))
    }

    fn decode_log(bytes: &[u8]) -> Result<MessageLog, StoreError> {
        let raw = lz4_flex::decompress_size_prepended(bytes)
            .map_err(|e| StoreError::CompressionError(e.to_string()))?;
        let (log, _) = bincode::serde::decode_from_slice(&raw, bincode::config::standard())
            .map_err(|e| StoreError::DeserializationError(e.to_string()))?;
        Ok(log)
    }

    // ─── Room access ──────────────────────────────────────────────────

    fn load_participants(&self, room_id: &str) -> Result<Option<BTreeSet<String>>, StoreError> {
        let cf = self.cf(CF_ROOMS)?;
        match self.db.get_cf(&cf, room_id.as_bytes())? {
            Some(bytes) => Ok(Some(Self::decode_participants(&bytes)?)),
            None => Ok(None),
        }
    }

    fn load_log(&self, room_id: &str) -> Result<Option<MessageLog>, StoreError> {
        let cf = self.cf(CF_LOGS)?;
        match self.db.get_cf(&cf, room_id.as_bytes())? {
            Some(bytes) => Ok(Some(Self::decode_log(&bytes)?)),
            None => Ok(None),
        }
    }

    fn store_participants(
        &self,
        room_id: &str,
        participants: &BTreeSet<String>,
    ) -> Result<(), StoreError> {
        let cf = self.cf(CF_ROOMS)?;
        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(self.config.sync_writes);
        self.db.put_cf_opt(
            &cf,
            room_id.as_bytes(),
            Self::encode_participants(participants)?,
            &write_opts,
        )?;
        Ok(())
    }

    fn store_log(&self, room_id: &str, log: &MessageLog) -> Result<(), StoreError> {
        let cf = self.cf(CF_LOGS)?;
        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(self.config.sync_writes);
        self.db
            .put_cf_opt(&cf, room_id.as_bytes(), Self::encode_log(log)?, &write_opts)?;
        Ok(())
    }

    /// Get a column family handle.
    fn cf(&self, name: &str) -> Result<&rocksdb::ColumnFamily, StoreError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::DatabaseError(format!("Column family '{name}' not found")))
    }
}

impl RoomStore for RocksStore {
    fn get_or_create_room(&self, room_id: &str) -> Result<RoomRecord, StoreError> {
        match self.load_participants(room_id)? {
            Some(participants) => {
                let log = self.load_log(room_id)?.unwrap_or_default();
                Ok(RoomRecord {
                    room_id: room_id.to_string(),
                    participants,
                    log,
                })
            }
            None => {
                let record = RoomRecord::new(room_id);
                self.store_participants(room_id, &record.participants)?;
                log::debug!("Created room {room_id}");
                Ok(record)
            }
        }
    }

    fn add_participant(&self, room_id: &str, account_id: &str) -> Result<(), StoreError> {
        let mut participants = self.load_participants(room_id)?.unwrap_or_default();
        if participants.insert(account_id.to_string()) {
            self.store_participants(room_id, &participants)?;
        }
        Ok(())
    }

    fn append_message(&self, room_id: &str, message: ChatMessage) -> Result<bool, StoreError> {
        // Lazy creation: first message to an unseen room creates it
        if self.load_participants(room_id)?.is_none() {
            self.store_participants(room_id, &BTreeSet::new())?;
        }

        let mut log = self.load_log(room_id)?.unwrap_or_default();
        if !log.append(message) {
            return Ok(false);
        }
        self.store_log(room_id, &log)?;
        Ok(true)
    }

    fn mark_deleted(
        &self,
        room_id: &str,
        message_id: &str,
        account_ids: &BTreeSet<String>,
    ) -> Result<bool, StoreError> {
        let Some(mut log) = self.load_log(room_id)? else {
            return Ok(false);
        };
        if !log.mark_deleted_for(message_id, account_ids) {
            return Ok(false);
        }
        self.store_log(room_id, &log)?;
        Ok(true)
    }

    fn clear_messages(&self, room_id: &str) -> Result<(), StoreError> {
        if self.load_log(room_id)?.is_some() {
            self.store_log(room_id, &MessageLog::new())?;
        }
        Ok(())
    }

    fn delete_room(&self, room_id: &str) -> Result<(), StoreError> {
        let cf_rooms = self.cf(CF_ROOMS)?;
        let cf_logs = self.cf(CF_LOGS)?;

        let mut batch = WriteBatch::default();
        batch.delete_cf(&cf_rooms, room_id.as_bytes());
        batch.delete_cf(&cf_logs, room_id.as_bytes());
        self.db.write(batch)?;
        Ok(())
    }

    fn history(&self, room_id: &str) -> Result<Vec<ChatMessage>, StoreError> {
        Ok(self
            .load_log(room_id)?
            .map(|log| log.history().to_vec())
            .unwrap_or_default())
    }

    fn participants(&self, room_id: &str) -> Result<BTreeSet<String>, StoreError> {
        Ok(self.load_participants(room_id)?.unwrap_or_default())
    }
}

impl From<rocksdb::Error> for StoreError {
    fn from(e: rocksdb::Error) -> Self {
        StoreError::DatabaseError(e.to_string())
    }
}

/// Get number of CPU cores for RocksDB parallelism.
fn num_cpus() -> i32 {
    std::thread::available_parallelism()
        .map(|n| n.get() as i32)
        .unwrap_or(4)
}
