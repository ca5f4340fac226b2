mod fsio;
mod layout;
mod mount;
mod status;
mod systems;

pub use fsio::{
    copy_dir_recursive, copy_file, ensure_path_within_limit, entry_is_dir, make_symlink, mkdir_p,
    read_file, recursive_delete, remove_file_if_exists, rename_replacing, sync_filesystems,
    write_file,
};
pub use layout::{SystemsLayout, CURRENT_SYSTEM, UNPACK_SYSTEM};
pub use mount::{bind_mount_if_needed, is_mount_point, path_is_writable, try_lazy_unmount};
pub use status::{SystemStatus, MAX_TRIES};
pub use systems::{newest_non_bad, read_system_index, system_status, write_current_status};
