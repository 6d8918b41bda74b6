//! Fixed locations and commands on the device.

/// Directory holding template images
pub const TEMPLATES_DIR: &str = "/usr/share/remarkable/templates";

/// Template manifest read by the device UI
pub const MANIFEST_PATH: &str = "/usr/share/remarkable/templates/templates.json";

/// Directory holding system images (splash screens, sleep screens)
pub const SYSTEM_IMAGES_DIR: &str = "/usr/share/remarkable";

/// Device UI configuration file
pub const DEVICE_CONFIG_PATH: &str = "/home/root/.config/remarkable/xochitl.conf";

/// Restarts the device UI service
pub const RESTART_COMMAND: &str = "systemctl restart xochitl";

/// Suffix of the copy kept before a device file is overwritten
pub const BACKUP_SUFFIX: &str = ".backup";

/// Remote path of a template file by its storage filename.
pub fn template_path(storage_filename: &str) -> String {
    format!("{}/{}", TEMPLATES_DIR, storage_filename)
}
