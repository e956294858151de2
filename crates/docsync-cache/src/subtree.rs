//! Path arithmetic shared by the store implementations

use docsync_core::domain::{
    newtypes::{RemotePath, SyncPath},
    DomainError, SyncItem,
};

/// String prefix every strict descendant of `path` starts with
pub(crate) fn descendant_prefix(path: &SyncPath) -> String {
    let mut prefix = path.to_string();
    if !prefix.ends_with('/') {
        prefix.push('/');
    }
    prefix
}

/// Re-keys `item`, which lies at or below `from`, under the new location
pub(crate) fn relocate(
    mut item: SyncItem,
    from: &SyncPath,
    to_local: &SyncPath,
    to_remote: &RemotePath,
) -> Result<SyncItem, DomainError> {
    let new_local = item.local_path().rebase(from, to_local)?;
    let relative = item.local_path().relative_to(from)?;
    let new_remote = to_remote.join_relative(&relative.to_string_lossy())?;
    item.relocate(new_local, new_remote);
    Ok(item)
}
