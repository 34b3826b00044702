//! Layer-template and expansion tables consumed by the path resolver.
//!
//! Templates are listed from lowest to highest priority. Tokens such as
//! `{ENGINE}`, `{PLATFORM}` and `{TYPE}` are substituted by the resolver.

use serde::{Deserialize, Serialize};

/// One row of the layer table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerTemplate {
    pub name: String,
    pub path: String,
    /// Expansion variants are not applied to this template.
    #[serde(default)]
    pub no_expand: bool,
    /// Only added to the hierarchy when the file is present on disk.
    #[serde(default)]
    pub requires_existence: bool,
    /// Skipped entirely when no custom config name is configured.
    #[serde(default)]
    pub requires_custom_config: bool,
    /// Skipped entirely when no optional sub-directory is configured.
    #[serde(default)]
    pub requires_sub_dir: bool,
}

impl LayerTemplate {
    pub fn new(name: &str, path: &str) -> Self {
        Self {
            name: name.to_string(),
            path: path.to_string(),
            no_expand: false,
            requires_existence: false,
            requires_custom_config: false,
            requires_sub_dir: false,
        }
    }

    fn no_expand(mut self) -> Self {
        self.no_expand = true;
        self
    }

    fn requires_existence(mut self) -> Self {
        self.requires_existence = true;
        self
    }

    fn requires_custom_config(mut self) -> Self {
        self.requires_custom_config = true;
        self
    }

    fn requires_sub_dir(mut self) -> Self {
        self.requires_sub_dir = true;
        self
    }

    /// Whether resolution of this template differs per platform.
    pub fn is_platform_specific(&self) -> bool {
        self.path.contains("{PLATFORM}")
    }
}

/// Resolution modes an expansion variant applies in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpansionModes {
    #[serde(default)]
    pub cooked: bool,
    #[serde(default)]
    pub uncooked: bool,
    #[serde(default)]
    pub plugin: bool,
}

impl ExpansionModes {
    pub const ALL: Self = Self {
        cooked: true,
        uncooked: true,
        plugin: true,
    };
}

/// A path-fragment substitution that yields an alternative location for a layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expansion {
    pub name: String,
    /// `(before, after)` fragment pairs. An empty list is the identity variant.
    #[serde(default)]
    pub substitutions: Vec<(String, String)>,
    #[serde(flatten)]
    pub modes: ExpansionModes,
}

impl Expansion {
    fn new(name: &str, substitutions: &[(&str, &str)], modes: ExpansionModes) -> Self {
        Self {
            name: name.to_string(),
            substitutions: substitutions
                .iter()
                .map(|(a, b)| (a.to_string(), b.to_string()))
                .collect(),
            modes,
        }
    }

    pub fn is_identity(&self) -> bool {
        self.substitutions.is_empty()
    }

    /// Apply the substitutions. `None` when nothing changed.
    pub fn apply(&self, path: &str) -> Option<String> {
        if self.is_identity() {
            return Some(path.to_string());
        }
        let mut out = path.to_string();
        for (before, after) in &self.substitutions {
            out = out.replace(before.as_str(), after);
        }
        (out != path).then_some(out)
    }
}

pub fn default_layers() -> Vec<LayerTemplate> {
    vec![
        LayerTemplate::new("AbsoluteBase", "{ENGINE}/Config/Base.ini")
            .no_expand()
            .requires_existence(),
        LayerTemplate::new("Base", "{ENGINE}/Config/Base{TYPE}.ini"),
        LayerTemplate::new("BasePlatform", "{ENGINE}/Config/{PLATFORM}/Base{PLATFORM}{TYPE}.ini"),
        LayerTemplate::new("ProjectDefault", "{PROJECT}/Config/Default{TYPE}.ini"),
        LayerTemplate::new("ProjectGenerated", "{PROJECT}/Config/Generated{TYPE}.ini"),
        LayerTemplate::new("ProjectSubDir", "{PROJECT}/Config/{OPT_SUBDIR}Default{TYPE}.ini")
            .requires_sub_dir(),
        LayerTemplate::new(
            "CustomConfig",
            "{PROJECT}/Config/Custom/{CUSTOMCONFIG}/Default{TYPE}.ini",
        )
        .requires_custom_config(),
        LayerTemplate::new("EnginePlatform", "{ENGINE}/Config/{PLATFORM}/{PLATFORM}{TYPE}.ini"),
        LayerTemplate::new("ProjectPlatform", "{PROJECT}/Config/{PLATFORM}/{PLATFORM}{TYPE}.ini"),
        LayerTemplate::new(
            "ProjectPlatformGenerated",
            "{PROJECT}/Config/{PLATFORM}/Generated{PLATFORM}{TYPE}.ini",
        ),
        LayerTemplate::new(
            "CustomConfigPlatform",
            "{PROJECT}/Config/{PLATFORM}/Custom/{CUSTOMCONFIG}/{PLATFORM}{TYPE}.ini",
        )
        .requires_custom_config(),
        LayerTemplate::new("UserSettingsDir", "{USERSETTINGS}Strata/Config/User{TYPE}.ini")
            .no_expand(),
        LayerTemplate::new("AppSettingsDir", "{APPSETTINGS}Strata/Config/User{TYPE}.ini")
            .no_expand(),
        LayerTemplate::new("UserDir", "{USER}Strata/Config/User{TYPE}.ini").no_expand(),
        LayerTemplate::new("ProjectUser", "{PROJECT}/Config/User{TYPE}.ini").no_expand(),
    ]
}

pub fn default_plugin_layers() -> Vec<LayerTemplate> {
    vec![
        LayerTemplate::new("PluginBase", "{PLUGIN}/Config/Base{TYPE}.ini"),
        LayerTemplate::new("PluginDefault", "{PLUGIN}/Config/Default{TYPE}.ini"),
        LayerTemplate::new("PluginPlatform", "{PLUGIN}/Config/{PLATFORM}/{PLATFORM}{TYPE}.ini"),
        LayerTemplate::new(
            "ProjectPluginDefault",
            "{PROJECT}/Config/Plugins/{PLUGINNAME}/Default{TYPE}.ini",
        ),
    ]
}

pub fn default_expansions() -> Vec<Expansion> {
    let uncooked = ExpansionModes {
        cooked: false,
        uncooked: true,
        plugin: true,
    };
    vec![
        Expansion::new("Source", &[], ExpansionModes::ALL),
        Expansion::new(
            "NotForLicensees",
            &[
                ("{ENGINE}/", "{ENGINE}/Restricted/NotForLicensees/"),
                ("{PROJECT}/Config/", "{RESTRICTEDPROJECT_NFL}/Config/"),
                ("{PLUGIN}/", "{PLUGIN}/Restricted/NotForLicensees/"),
            ],
            uncooked,
        ),
        Expansion::new(
            "NoRedist",
            &[
                ("{ENGINE}/", "{ENGINE}/Restricted/NoRedist/"),
                ("{PROJECT}/Config/", "{RESTRICTEDPROJECT_NR}/Config/"),
                ("{PLUGIN}/", "{PLUGIN}/Restricted/NoRedist/"),
            ],
            uncooked,
        ),
        Expansion::new(
            "PlatformExtension",
            &[
                ("{ENGINE}/Config/{PLATFORM}/", "{EXTENGINE}/Config/"),
                ("{PROJECT}/Config/{PLATFORM}/", "{EXTPROJECT}/Config/"),
                ("{PLUGIN}/Config/{PLATFORM}/", "{EXTPLUGIN}/Config/"),
            ],
            ExpansionModes::ALL,
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expansion_apply() {
        let expansions = default_expansions();
        assert!(expansions[0].is_identity());
        assert_eq!(
            expansions[0].apply("{ENGINE}/Config/Base{TYPE}.ini").as_deref(),
            Some("{ENGINE}/Config/Base{TYPE}.ini")
        );
        assert_eq!(
            expansions[1].apply("{ENGINE}/Config/Base{TYPE}.ini").as_deref(),
            Some("{ENGINE}/Restricted/NotForLicensees/Config/Base{TYPE}.ini")
        );
        assert_eq!(
            expansions[3].apply("{ENGINE}/Config/Base{TYPE}.ini"),
            None,
            "platform extension does not touch non-platform templates"
        );
        assert_eq!(
            expansions[3]
                .apply("{PROJECT}/Config/{PLATFORM}/{PLATFORM}{TYPE}.ini")
                .as_deref(),
            Some("{EXTPROJECT}/Config/{PLATFORM}{TYPE}.ini")
        );
    }

    #[test]
    fn test_default_tables() {
        let layers = default_layers();
        assert_eq!(layers[0].name, "AbsoluteBase");
        assert!(layers[0].requires_existence && layers[0].no_expand);
        assert!(layers.iter().any(|l| l.requires_custom_config));
        assert!(layers.iter().filter(|l| l.is_platform_specific()).count() >= 4);
        assert!(
            default_plugin_layers()
                .iter()
                .all(|l| l.path.contains("{PLUGIN"))
        );
    }

    #[test]
    fn test_tables_deserialize_from_toml() {
        #[derive(Deserialize)]
        struct Tables {
            layers: Vec<LayerTemplate>,
            expansions: Vec<Expansion>,
        }
        let tables: Tables = toml::from_str(
            r#"
            [[layers]]
            name = "Only"
            path = "{PROJECT}/Config/{TYPE}.ini"
            requires_existence = true

            [[expansions]]
            name = "Mirror"
            substitutions = [["{PROJECT}/", "{PROJECT}/Mirror/"]]
            uncooked = true
            "#,
        )
        .unwrap();
        assert!(tables.layers[0].requires_existence);
        assert!(!tables.layers[0].no_expand);
        assert!(tables.expansions[0].modes.uncooked);
        assert!(!tables.expansions[0].modes.cooked);
    }
}
