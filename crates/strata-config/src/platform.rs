use std::collections::BTreeMap;

use crate::settings::PlatformInfo;

/// Pseudo-platform inserted after the real chain when running as a server.
pub const DEDICATED_SERVER: &str = "DedicatedServer";

/// Built-in parent links, used when settings do not describe a platform.
const BUILTIN_PARENTS: &[(&str, &str)] = &[("LinuxArm64", "Linux"), ("WinGDK", "Windows")];

/// Ancestor chain for `platform`, from most general to `platform` itself.
pub fn platform_ancestry(
    platforms: &BTreeMap<String, PlatformInfo>,
    platform: &str,
) -> Vec<String> {
    let mut chain = vec![platform.to_string()];
    let mut current = platform.to_string();
    while let Some(parent) = parent_of(platforms, &current) {
        if chain.iter().any(|p| p == &parent) {
            tracing::warn!(
                platform,
                parent = %parent,
                "platform parent cycle, truncating ancestry"
            );
            break;
        }
        chain.push(parent.clone());
        current = parent;
    }
    chain.reverse();
    chain
}

fn parent_of(platforms: &BTreeMap<String, PlatformInfo>, platform: &str) -> Option<String> {
    if let Some(info) = platforms.get(platform) {
        return info.parent.clone().filter(|p| !p.is_empty());
    }
    BUILTIN_PARENTS
        .iter()
        .find(|(child, _)| *child == platform)
        .map(|(_, parent)| parent.to_string())
}

/// The platform this process runs on, in layer-directory naming.
pub fn host_platform() -> &'static str {
    if cfg!(target_os = "windows") {
        "Windows"
    } else if cfg!(target_os = "macos") {
        "Mac"
    } else {
        "Linux"
    }
}
