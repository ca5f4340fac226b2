use super::*;

use std::fs;
use std::os::unix::fs as unix_fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use strata_core::{SystemStatus, SystemsLayout};

static TEST_ROOT_COUNTER: AtomicU64 = AtomicU64::new(0);

fn test_root() -> PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system time")
        .as_nanos();
    let counter = TEST_ROOT_COUNTER.fetch_add(1, Ordering::SeqCst);
    let mut path = std::env::temp_dir();
    path.push(format!(
        "strata-installer-test-{}-{nanos}-{counter}",
        std::process::id()
    ));
    fs::create_dir_all(&path).expect("must create test root");
    path
}

fn test_layout() -> SystemsLayout {
    let root = test_root();
    SystemsLayout::new(root.join("strata"), root.join("factory"))
        .with_legacy_root(root.join("legacy"))
}

fn stage_factory_image(layout: &SystemsLayout, version: &str, apps: &[(&str, &str)]) {
    let system = layout.factory_system_dir();
    for dir in ["bin", "lib", "modules"] {
        fs::create_dir_all(system.join(dir)).expect("must create factory dir");
    }
    fs::write(system.join("bin").join("supervisor"), "#!/bin/sh\n")
        .expect("must write factory supervisor");
    fs::create_dir_all(layout.factory_config_dir()).expect("must create factory config");
    for name in ["apps.cfg", "users.cfg", "modules.cfg"] {
        fs::write(layout.factory_config_dir().join(name), format!("{name}\n"))
            .expect("must write factory config file");
    }
    fs::write(layout.factory_version_path(), version).expect("must write factory version");
    fs::write(layout.factory_info_path(), "build=release\n").expect("must write factory info");

    fs::create_dir_all(layout.factory_apps_dir()).expect("must create factory apps dir");
    for (name, hash) in apps {
        let store = layout.factory_app_store_entry(hash);
        fs::create_dir_all(store.join("read-only")).expect("must create factory app store entry");
        fs::write(store.join("read-only").join("root.cfg"), format!("{name}\n"))
            .expect("must write factory app payload");
        unix_fs::symlink(&store, layout.factory_app_link(name)).expect("must link factory app");
    }
}

fn write_system(layout: &SystemsLayout, name: &str, index: u32, status: Option<&str>) {
    fs::create_dir_all(layout.system_dir(name)).expect("must create system dir");
    fs::write(layout.system_index_path(name), index.to_string()).expect("must write index");
    if let Some(status) = status {
        fs::write(layout.system_status_path(name), status).expect("must write status");
    }
}

#[test]
fn first_boot_installs_factory_system_as_index_zero() {
    let layout = test_layout();
    stage_factory_image(&layout, "1.0", &[("echo", "a1b2c3")]);

    assert!(should_install_golden(&layout, None));
    let index = install_golden(&layout, None, None).expect("must install");
    assert_eq!(index, 0);

    let current = layout.current_system_dir();
    assert!(current.is_dir());
    assert!(!layout.unpack_dir().exists());
    assert_eq!(
        fs::read_to_string(layout.system_index_path("current")).expect("must read index"),
        "0"
    );
    assert_eq!(
        fs::read_to_string(layout.system_status_path("current")).expect("must read status"),
        "good"
    );
    assert_eq!(
        fs::read_to_string(current.join("version")).expect("must read version"),
        "1.0"
    );
    assert_eq!(
        fs::read_to_string(layout.installed_version_marker_path()).expect("must read marker"),
        "1.0"
    );
    assert!(layout.ldconfig_marker_path().is_file());

    assert_eq!(
        fs::read_link(current.join("bin")).expect("must read bin link"),
        layout.factory_system_dir().join("bin")
    );
    assert_eq!(
        fs::read_link(current.join("config").join("apps.cfg")).expect("must read config link"),
        layout.factory_config_dir().join("apps.cfg")
    );

    let app_link = current.join("apps").join("echo");
    assert_eq!(
        fs::read_link(&app_link).expect("must read app link"),
        layout.app_store_entry("a1b2c3")
    );
    assert_eq!(
        fs::read_link(layout.app_store_entry("a1b2c3")).expect("must read store link"),
        layout.factory_app_store_entry("a1b2c3")
    );
    assert!(current.join("appsWriteable").join("echo").is_dir());
}

#[test]
fn install_is_not_repeated_once_the_marker_matches() {
    let layout = test_layout();
    stage_factory_image(&layout, "1.0", &[]);

    install_golden(&layout, None, None).expect("must install");

    assert!(!should_install_golden(&layout, Some(0)));
    assert_eq!(
        fs::read_to_string(layout.installed_version_marker_path()).expect("must read marker"),
        "1.0"
    );
}

#[test]
fn factory_upgrade_supersedes_the_previous_current() {
    let layout = test_layout();
    stage_factory_image(&layout, "1.1", &[]);

    write_system(&layout, "current", 3, Some("good"));
    fs::create_dir_all(layout.system_config_dir("current")).expect("must create config");
    fs::write(
        layout.system_config_dir("current").join("site.cfg"),
        "answer=42\n",
    )
    .expect("must write config");
    fs::write(layout.installed_version_marker_path(), "1.0").expect("must write marker");

    assert!(should_install_golden(&layout, Some(3)));
    let index = install_golden(&layout, Some(3), Some(3)).expect("must install");
    assert_eq!(index, 4);

    assert_eq!(
        fs::read_to_string(layout.system_index_path("current")).expect("must read index"),
        "4"
    );
    assert_eq!(
        fs::read_to_string(layout.system_status_path("current")).expect("must read status"),
        "good"
    );
    assert_eq!(
        fs::read_to_string(layout.system_config_dir("current").join("site.cfg"))
            .expect("must read migrated config"),
        "answer=42\n"
    );
    assert_eq!(
        fs::read_to_string(layout.installed_version_marker_path()).expect("must read marker"),
        "1.1"
    );
    assert!(!layout.indexed_system_dir(3).exists());
    assert!(!layout.unpack_dir().exists());
}

#[test]
fn malformed_factory_image_never_triggers_install() {
    let layout = test_layout();
    fs::create_dir_all(layout.factory_system_dir()).expect("must create factory dir");

    assert!(!should_install_golden(&layout, Some(0)));
    assert!(should_install_golden(&layout, None));
}

#[test]
fn leftover_directory_at_the_target_index_is_replaced() {
    let layout = test_layout();
    stage_factory_image(&layout, "2.0", &[]);

    write_system(&layout, "0", 0, Some("good"));
    write_system(&layout, "1", 1, Some("bad"));
    fs::write(layout.system_dir("1").join("junk"), "stale").expect("must write junk");

    let index = install_golden(&layout, Some(0), None).expect("must install");
    assert_eq!(index, 1);
    assert_eq!(
        fs::read_to_string(layout.system_index_path("current")).expect("must read index"),
        "1"
    );
    assert!(!layout.indexed_system_dir(1).exists());
    assert!(!layout.indexed_system_dir(0).exists());
}

#[test]
fn install_migrates_app_writable_state_from_the_previous_system() {
    let layout = test_layout();
    stage_factory_image(&layout, "2.0", &[("echo", "a1b2c3")]);

    write_system(&layout, "current", 0, Some("good"));
    let prev_writable = layout.system_writable_dir("current").join("echo");
    fs::create_dir_all(&prev_writable).expect("must create writable dir");
    fs::write(prev_writable.join("state.db"), "persisted").expect("must write state");
    fs::write(layout.installed_version_marker_path(), "1.0").expect("must write marker");

    install_golden(&layout, Some(0), Some(0)).expect("must install");

    assert_eq!(
        fs::read_to_string(
            layout
                .system_writable_dir("current")
                .join("echo")
                .join("state.db")
        )
        .expect("must read migrated state"),
        "persisted"
    );
}

#[test]
fn install_harvests_legacy_writable_state_when_no_previous_system_exists() {
    let layout = test_layout();
    stage_factory_image(&layout, "1.0", &[("echo", "a1b2c3")]);

    let legacy_app = layout.legacy_app_dir("echo");
    fs::create_dir_all(&legacy_app).expect("must create legacy app dir");
    fs::write(legacy_app.join("settings.txt"), "legacy").expect("must write legacy state");

    install_golden(&layout, None, None).expect("must install");

    assert_eq!(
        fs::read_to_string(
            layout
                .system_writable_dir("current")
                .join("echo")
                .join("settings.txt")
        )
        .expect("must read harvested state"),
        "legacy"
    );
    assert!(!layout.legacy_root().exists());
}

#[test]
fn app_store_entries_are_shared_across_installs() {
    let layout = test_layout();
    stage_factory_image(&layout, "1.0", &[("echo", "a1b2c3")]);

    let store_entry = layout.app_store_entry("a1b2c3");
    fs::create_dir_all(&store_entry).expect("must create store entry");
    fs::write(store_entry.join("installed"), "already here").expect("must write store payload");

    fs::create_dir_all(layout.unpack_apps_dir()).expect("must create unpack apps");
    fs::create_dir_all(layout.unpack_writable_dir()).expect("must create unpack writable");

    set_up_app(&layout, "echo", None).expect("must stage app");

    assert!(!fs::symlink_metadata(&store_entry)
        .expect("must stat store entry")
        .file_type()
        .is_symlink());
    assert_eq!(
        fs::read_to_string(store_entry.join("installed")).expect("must read store payload"),
        "already here"
    );
    assert_eq!(
        fs::read_link(layout.unpack_apps_dir().join("echo")).expect("must read app link"),
        store_entry
    );
}

#[test]
fn set_up_app_reads_the_hash_from_the_factory_link() {
    let layout = test_layout();
    stage_factory_image(&layout, "1.0", &[("netmon", "deadbeef01")]);
    fs::create_dir_all(layout.unpack_apps_dir()).expect("must create unpack apps");
    fs::create_dir_all(layout.unpack_writable_dir()).expect("must create unpack writable");

    set_up_app(&layout, "netmon", None).expect("must stage app");

    assert_eq!(
        fs::read_link(layout.unpack_apps_dir().join("netmon")).expect("must read app link"),
        layout.app_store_entry("deadbeef01")
    );
    assert_eq!(
        fs::read_link(layout.app_store_entry("deadbeef01")).expect("must read store link"),
        layout.factory_app_store_entry("deadbeef01")
    );
}

#[test]
fn writable_update_hook_runs_for_every_staged_app() {
    let layout = test_layout();
    stage_factory_image(&layout, "1.0", &[("alpha", "hash-a"), ("beta", "hash-b")]);

    let mut seen = Vec::new();
    install_golden_with_hook(&layout, None, None, |_, hash, name| {
        seen.push((hash.to_string(), name.to_string()));
        Ok(())
    })
    .expect("must install");

    seen.sort();
    assert_eq!(
        seen,
        vec![
            ("hash-a".to_string(), "alpha".to_string()),
            ("hash-b".to_string(), "beta".to_string()),
        ]
    );
}

#[test]
fn install_factory_apps_stages_every_app() {
    let layout = test_layout();
    stage_factory_image(&layout, "1.0", &[("alpha", "hash-a"), ("beta", "hash-b")]);
    fs::create_dir_all(layout.unpack_apps_dir()).expect("must create unpack apps");
    fs::create_dir_all(layout.unpack_writable_dir()).expect("must create unpack writable");

    install_factory_apps(&layout, None);

    for (name, hash) in [("alpha", "hash-a"), ("beta", "hash-b")] {
        assert_eq!(
            fs::read_link(layout.unpack_apps_dir().join(name)).expect("must read app link"),
            layout.app_store_entry(hash)
        );
        assert!(layout.unpack_writable_dir().join(name).is_dir());
    }
}

#[test]
fn import_config_trees_targets_an_indexed_system() {
    let layout = test_layout();
    write_system(&layout, "4", 4, Some("good"));
    fs::create_dir_all(layout.indexed_config_dir(4)).expect("must create old config");
    fs::write(layout.indexed_config_dir(4).join("site.cfg"), "kept").expect("must write config");
    write_system(&layout, "5", 5, None);

    import_config_trees(&layout, 4, Some(5));

    assert_eq!(
        fs::read_to_string(layout.indexed_config_dir(5).join("site.cfg"))
            .expect("must read imported config"),
        "kept"
    );
}

#[test]
fn delete_all_but_current_keeps_only_the_current_system() {
    let layout = test_layout();
    write_system(&layout, "current", 2, Some("good"));
    write_system(&layout, "0", 0, Some("bad"));
    write_system(&layout, "1", 1, Some("good"));
    fs::create_dir_all(layout.legacy_root()).expect("must create legacy root");
    fs::write(layout.legacy_root().join("old"), "x").expect("must write legacy file");
    fs::write(layout.systems_dir().join("notes.txt"), "keep me").expect("must write stray file");

    delete_all_but_current(&layout);

    assert!(layout.current_system_dir().is_dir());
    assert!(!layout.indexed_system_dir(0).exists());
    assert!(!layout.indexed_system_dir(1).exists());
    assert!(!layout.legacy_root().exists());
    assert!(layout.systems_dir().join("notes.txt").is_file());
}

#[test]
fn installed_status_is_good_by_fiat() {
    let layout = test_layout();
    stage_factory_image(&layout, "1.0", &[]);

    install_golden(&layout, None, None).expect("must install");

    let raw =
        fs::read_to_string(layout.system_status_path("current")).expect("must read status");
    assert_eq!(SystemStatus::parse(&raw), SystemStatus::Good);
}
