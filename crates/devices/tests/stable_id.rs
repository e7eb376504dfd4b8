#![cfg(unix)]

use std::fs;
use std::os::unix::fs::symlink;
use std::path::Path;

use vidnode_devices::DeviceRoots;
use vidnode_devices::device::{by_id_link, node_index, stable_id, synthetic_id, usb_identity, video_nodes};

/// Builds a fake sysfs class directory, USB device tree and by-id directory.
fn fixture(root: &Path) -> DeviceRoots {
    let roots = DeviceRoots {
        sysfs_class: root.join("class"),
        by_id: root.join("by-id"),
        dev: root.join("dev"),
    };
    let usb = root.join("devices/usb1/1-2");
    let interface = usb.join("1-2:1.0");
    fs::create_dir_all(&interface).unwrap();
    fs::write(usb.join("idVendor"), "046d\n").unwrap();
    fs::write(usb.join("idProduct"), "085c\n").unwrap();
    fs::write(usb.join("serial"), "A1B2C3\n").unwrap();

    for (node, index) in [("video0", 0), ("video1", 1), ("video10", 0)] {
        let dir = roots.sysfs_class.join(node);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("index"), format!("{index}\n")).unwrap();
    }
    symlink(&interface, roots.sysfs_class.join("video0/device")).unwrap();
    symlink(&interface, roots.sysfs_class.join("video1/device")).unwrap();
    fs::create_dir_all(roots.sysfs_class.join("vbi0")).unwrap();

    fs::create_dir_all(&roots.by_id).unwrap();
    symlink("../../video0", roots.by_id.join("usb-046d_C922_A1B2C3-video-index0")).unwrap();
    symlink("../../video1", roots.by_id.join("usb-046d_C922_A1B2C3-video-index1")).unwrap();
    roots
}

#[test]
fn nodes_are_listed_in_numeric_order() {
    let dir = tempfile::tempdir().unwrap();
    let roots = fixture(dir.path());
    assert_eq!(video_nodes(&roots).unwrap(), ["video0", "video1", "video10"]);
}

#[test]
fn missing_class_directory_means_no_devices() {
    let dir = tempfile::tempdir().unwrap();
    let roots = DeviceRoots {
        sysfs_class: dir.path().join("absent"),
        ..DeviceRoots::default()
    };
    assert!(video_nodes(&roots).unwrap().is_empty());
}

#[test]
fn by_id_link_must_match_node_and_index() {
    let dir = tempfile::tempdir().unwrap();
    let roots = fixture(dir.path());

    assert_eq!(node_index(&roots, "video1"), 1);
    assert_eq!(
        by_id_link(&roots, "video0", 0).as_deref(),
        Some("usb-046d_C922_A1B2C3-video-index0")
    );
    assert_eq!(
        by_id_link(&roots, "video1", 1).as_deref(),
        Some("usb-046d_C922_A1B2C3-video-index1")
    );
    assert!(by_id_link(&roots, "video1", 0).is_none());
    assert!(by_id_link(&roots, "video10", 0).is_none());
}

#[test]
fn stable_id_prefers_by_id_link() {
    let dir = tempfile::tempdir().unwrap();
    let roots = fixture(dir.path());
    assert_eq!(
        stable_id(&roots, "video0", "usb-0000:00:14.0-2", "C922"),
        "usb-046d_C922_A1B2C3-video-index0"
    );
}

#[test]
fn synthetic_id_uses_usb_identity() {
    let dir = tempfile::tempdir().unwrap();
    let roots = fixture(dir.path());
    fs::remove_dir_all(&roots.by_id).unwrap();

    assert_eq!(
        usb_identity(&roots, "video1"),
        Some(("046d".into(), "085c".into(), "A1B2C3".into()))
    );
    let id = stable_id(&roots, "video1", "usb-0000:00:14.0-2", "C922");
    assert_eq!(id, synthetic_id("046d:085c:A1B2C3", 1));

    // The same camera on another port keeps its ID.
    let moved = stable_id(&roots, "video1", "usb-0000:00:14.0-4", "C922");
    assert_eq!(moved, id);
}

#[test]
fn synthetic_id_without_usb_parent_uses_bus_info() {
    let dir = tempfile::tempdir().unwrap();
    let roots = fixture(dir.path());

    assert!(usb_identity(&roots, "video10").is_none());
    let id = stable_id(&roots, "video10", "platform:fdee0000.hdmirx", "rk_hdmirx");
    assert_eq!(id, synthetic_id("platform:fdee0000.hdmirx:rk_hdmirx", 0));
}
