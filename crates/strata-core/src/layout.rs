use std::path::{Path, PathBuf};

pub const CURRENT_SYSTEM: &str = "current";
pub const UNPACK_SYSTEM: &str = "unpack";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemsLayout {
    writable_root: PathBuf,
    factory_root: PathBuf,
    legacy_root: PathBuf,
}

impl SystemsLayout {
    pub fn new(writable_root: impl Into<PathBuf>, factory_root: impl Into<PathBuf>) -> Self {
        Self {
            writable_root: writable_root.into(),
            factory_root: factory_root.into(),
            legacy_root: PathBuf::from("/mnt/flash/opt/strata"),
        }
    }

    pub fn default_device() -> Self {
        Self::new("/strata", "/mnt/strata")
    }

    pub fn with_legacy_root(mut self, legacy_root: impl Into<PathBuf>) -> Self {
        self.legacy_root = legacy_root.into();
        self
    }

    pub fn writable_root(&self) -> &Path {
        &self.writable_root
    }

    pub fn factory_root(&self) -> &Path {
        &self.factory_root
    }

    pub fn legacy_root(&self) -> &Path {
        &self.legacy_root
    }

    pub fn legacy_app_dir(&self, app_name: &str) -> PathBuf {
        self.legacy_root.join(app_name)
    }

    pub fn systems_dir(&self) -> PathBuf {
        self.writable_root.join("systems")
    }

    pub fn system_dir(&self, name: &str) -> PathBuf {
        self.systems_dir().join(name)
    }

    pub fn indexed_system_dir(&self, index: u32) -> PathBuf {
        self.systems_dir().join(index.to_string())
    }

    pub fn current_system_dir(&self) -> PathBuf {
        self.system_dir(CURRENT_SYSTEM)
    }

    pub fn unpack_dir(&self) -> PathBuf {
        self.system_dir(UNPACK_SYSTEM)
    }

    pub fn system_index_path(&self, name: &str) -> PathBuf {
        self.system_dir(name).join("index")
    }

    pub fn system_status_path(&self, name: &str) -> PathBuf {
        self.system_dir(name).join("status")
    }

    pub fn system_config_dir(&self, name: &str) -> PathBuf {
        self.system_dir(name).join("config")
    }

    pub fn indexed_config_dir(&self, index: u32) -> PathBuf {
        self.indexed_system_dir(index).join("config")
    }

    pub fn system_apps_dir(&self, name: &str) -> PathBuf {
        self.system_dir(name).join("apps")
    }

    pub fn system_writable_dir(&self, name: &str) -> PathBuf {
        self.system_dir(name).join("appsWriteable")
    }

    pub fn unpack_config_dir(&self) -> PathBuf {
        self.system_config_dir(UNPACK_SYSTEM)
    }

    pub fn unpack_apps_dir(&self) -> PathBuf {
        self.system_apps_dir(UNPACK_SYSTEM)
    }

    pub fn unpack_writable_dir(&self) -> PathBuf {
        self.system_writable_dir(UNPACK_SYSTEM)
    }

    pub fn app_store_dir(&self) -> PathBuf {
        self.writable_root.join("apps")
    }

    pub fn app_store_entry(&self, hash: &str) -> PathBuf {
        self.app_store_dir().join(hash)
    }

    pub fn app_store_unpack_dir(&self) -> PathBuf {
        self.app_store_dir().join(UNPACK_SYSTEM)
    }

    pub fn installed_version_marker_path(&self) -> PathBuf {
        self.writable_root.join("factory.version")
    }

    pub fn ldconfig_marker_path(&self) -> PathBuf {
        self.systems_dir().join("needs_ldconfig")
    }

    pub fn factory_system_dir(&self) -> PathBuf {
        self.factory_root.join("system")
    }

    pub fn factory_version_path(&self) -> PathBuf {
        self.factory_system_dir().join("version")
    }

    pub fn factory_info_path(&self) -> PathBuf {
        self.factory_system_dir().join("info.properties")
    }

    pub fn factory_config_dir(&self) -> PathBuf {
        self.factory_system_dir().join("config")
    }

    pub fn factory_apps_dir(&self) -> PathBuf {
        self.factory_system_dir().join("apps")
    }

    pub fn factory_app_link(&self, app_name: &str) -> PathBuf {
        self.factory_apps_dir().join(app_name)
    }

    pub fn factory_app_store_entry(&self, hash: &str) -> PathBuf {
        self.factory_root.join("apps").join(hash)
    }

    pub fn read_only_marker_path(&self) -> PathBuf {
        self.factory_root
            .join("systems")
            .join(CURRENT_SYSTEM)
            .join("read-only")
    }

    pub fn supervisor_path(&self) -> PathBuf {
        self.current_system_dir().join("bin").join("supervisor")
    }
}
