//! Snapshot storage in the browser's origin private file system.

use futures::FutureExt as _;
use futures::future::LocalBoxFuture;
use opfs::{
    DirectoryHandle as _, FileHandle as _, WritableFileStream as _,
    persistent::{self, DirectoryHandle},
};

use crate::snapshot::{SnapshotStorage, StorageError};

#[derive(Debug, Clone)]
pub struct OpfsStorage {
    directory: DirectoryHandle,
    file_name: String,
}

impl OpfsStorage {
    pub async fn new(file_name: impl Into<String>) -> Result<Self, StorageError> {
        let directory = opfs::persistent::app_specific_dir()
            .await
            .map_err(backend_error)?;
        Ok(Self {
            directory,
            file_name: file_name.into(),
        })
    }
}

fn backend_error(e: persistent::Error) -> StorageError {
    StorageError::Backend(format!("{e:?}"))
}

impl SnapshotStorage for OpfsStorage {
    fn read(&self) -> LocalBoxFuture<'_, Result<Option<Vec<u8>>, StorageError>> {
        async move {
            let file = self
                .directory
                .get_file_handle_with_options(
                    &self.file_name,
                    &opfs::GetFileHandleOptions { create: false },
                )
                .await;

            match file {
                Ok(file_handle) => {
                    let bytes = file_handle.read().await.map_err(backend_error)?;
                    Ok(Some(bytes))
                }
                // the file only exists once something has been persisted
                Err(_) => Ok(None),
            }
        }
        .boxed_local()
    }

    fn write(&self, bytes: Vec<u8>) -> LocalBoxFuture<'_, Result<(), StorageError>> {
        async move {
            let mut file_handle = self
                .directory
                .get_file_handle_with_options(
                    &self.file_name,
                    &opfs::GetFileHandleOptions { create: true },
                )
                .await
                .map_err(backend_error)?;

            let mut writable = file_handle
                .create_writable_with_options(&opfs::CreateWritableOptions {
                    keep_existing_data: false,
                })
                .await
                .map_err(backend_error)?;

            writable
                .write_at_cursor_pos(bytes)
                .await
                .map_err(backend_error)?;
            writable.close().await.map_err(backend_error)?;

            Ok(())
        }
        .boxed_local()
    }
}
