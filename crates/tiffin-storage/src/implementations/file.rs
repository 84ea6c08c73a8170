//! File-based storage backend.
//!
//! Each namespace gets its own directory under the base path and each record
//! is a JSON file named after its id. Each write goes to its own temporary
//! file in the same directory, which is then renamed over the target, so
//! readers never observe a partial record and concurrent writers of one key
//! never share a temporary file.

use crate::{StorageError, StorageFactory, StorageInterface, StorageRegistry};
use async_trait::async_trait;
use std::io::Write;
use std::path::PathBuf;
use tiffin_types::{
	ConfigSchema, Field, FieldType, ImplementationRegistry, Schema, ValidationError,
};
use tokio::fs;

const EXTENSION: &str = "json";

/// File-based storage implementation.
pub struct FileStorage {
	/// Base directory path for storing files.
	base_path: PathBuf,
}

impl FileStorage {
	/// Creates a new FileStorage rooted at `base_path`.
	pub fn new(base_path: PathBuf) -> Self {
		Self { base_path }
	}

	/// Replaces characters that could escape the namespace directory.
	fn sanitize(part: &str) -> String {
		part.replace(['/', '\\', ':'], "_")
	}

	/// Maps `namespace:id` to `<base>/<namespace>/<id>.json`.
	///
	/// Keys without a namespace land directly in the base directory.
	fn get_file_path(&self, key: &str) -> PathBuf {
		match key.split_once(':') {
			Some((namespace, id)) => self
				.base_path
				.join(Self::sanitize(namespace))
				.join(format!("{}.{}", Self::sanitize(id), EXTENSION)),
			None => self
				.base_path
				.join(format!("{}.{}", Self::sanitize(key), EXTENSION)),
		}
	}
}

#[async_trait]
impl StorageInterface for FileStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		let path = self.get_file_path(key);

		match fs::read(&path).await {
			Ok(data) => Ok(data),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StorageError::NotFound),
			Err(e) => Err(StorageError::Backend(e.to_string())),
		}
	}

	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
		let path = self.get_file_path(key);
		let dir = match path.parent() {
			Some(parent) => parent.to_path_buf(),
			None => self.base_path.clone(),
		};

		fs::create_dir_all(&dir)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;

		// The temp file is removed on drop if anything before persist fails
		tokio::task::spawn_blocking(move || -> std::io::Result<()> {
			let mut temp = tempfile::Builder::new()
				.prefix(".write-")
				.suffix(".tmp")
				.tempfile_in(&dir)?;
			temp.write_all(&value)?;
			temp.persist(&path).map_err(|e| e.error)?;
			Ok(())
		})
		.await
		.map_err(|e| StorageError::Backend(e.to_string()))?
		.map_err(|e| StorageError::Backend(e.to_string()))
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		let path = self.get_file_path(key);

		match fs::remove_file(&path).await {
			Ok(_) => Ok(()),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
			Err(e) => Err(StorageError::Backend(e.to_string())),
		}
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		fs::try_exists(self.get_file_path(key))
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))
	}

	async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
		// Only namespace prefixes ("orders:") map onto a directory
		let (namespace, id_prefix) = match prefix.split_once(':') {
			Some(parts) => parts,
			None => return Err(StorageError::Backend(format!(
				"File storage can only list by namespace, got prefix '{}'",
				prefix
			))),
		};
		let dir = self.base_path.join(Self::sanitize(namespace));

		let mut entries = match fs::read_dir(&dir).await {
			Ok(entries) => entries,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
			Err(e) => return Err(StorageError::Backend(e.to_string())),
		};

		let mut keys = Vec::new();
		while let Some(entry) = entries
			.next_entry()
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?
		{
			let path = entry.path();
			if path.extension() != Some(std::ffi::OsStr::new(EXTENSION)) {
				continue;
			}
			match path.file_stem().and_then(|s| s.to_str()) {
				Some(id) if id.starts_with(id_prefix) => {
					keys.push(format!("{}:{}", namespace, id));
				},
				Some(_) => {},
				None => {
					tracing::debug!("Skipping file {:?}: name is not valid UTF-8", path);
				},
			}
		}
		Ok(keys)
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(FileStorageSchema)
	}
}

/// Configuration schema for FileStorage.
pub struct FileStorageSchema;

impl ConfigSchema for FileStorageSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![],
			vec![Field::new("storage_path", FieldType::String).with_validator(|v| {
				match v.as_str() {
					Some(s) if s.trim().is_empty() => Err("storage_path cannot be empty".into()),
					_ => Ok(()),
				}
			})],
		);
		schema.validate(config)
	}
}

/// Factory function to create a file storage backend from configuration.
///
/// Configuration parameters:
/// - `storage_path`: Base directory for file storage (default: "./data/storage")
pub fn create_storage(config: &toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> {
	FileStorageSchema
		.validate(config)
		.map_err(|e| StorageError::Configuration(e.to_string()))?;

	let storage_path = config
		.get("storage_path")
		.and_then(|v| v.as_str())
		.unwrap_or("./data/storage");

	Ok(Box::new(FileStorage::new(PathBuf::from(storage_path))))
}

/// Registry for the file storage implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "file";
	type Factory = StorageFactory;

	fn factory() -> Self::Factory {
		create_storage
	}
}

impl StorageRegistry for Registry {}
