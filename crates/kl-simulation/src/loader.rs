//! World descriptions: the configuration-source seam and its JSON file form.

use std::path::{Path, PathBuf};

use kl_core::ModelConfig;
use serde::{Deserialize, Serialize};

use crate::error::SimResult;

/// Section type routed to the visualizer instead of creating a model.
pub const WINDOW_SECTION: &str = "window";

/// One declared model (or visualizer) section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    /// Type token, e.g. `"laser"`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Index of the parent section, which must precede this one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<usize>,
    /// Flat key/value parameters.
    #[serde(default)]
    pub config: ModelConfig,
}

impl Section {
    /// Create a section of the given type.
    pub fn new(kind: impl Into<String>, parent: Option<usize>, config: ModelConfig) -> Self {
        Self {
            kind: kind.into(),
            parent,
            config,
        }
    }
}

/// Supplies the world settings and model sections, and accepts them back on save.
pub trait ConfigSource: std::fmt::Debug {
    /// The `world` section.
    fn world_config(&self) -> &ModelConfig;

    /// Declared sections, parents before children.
    fn sections(&self) -> &[Section];

    /// Replace the world section with saved settings.
    fn save_world(&mut self, config: ModelConfig);

    /// Replace a section's parameters with the saved state of its model.
    fn save_section(&mut self, index: usize, config: ModelConfig);

    /// Write the description back to wherever it came from.
    fn persist(&mut self) -> SimResult<()>;
}

/// A world description stored as JSON.
///
/// ```json
/// { "world": { "name": "lab" },
///   "sections": [ { "type": "position", "config": { "name": "robot" } },
///                 { "type": "laser", "parent": 0 } ] }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorldFile {
    /// World-level settings.
    #[serde(default)]
    pub world: ModelConfig,
    /// Model and visualizer sections in declaration order.
    #[serde(default)]
    pub sections: Vec<Section>,
    #[serde(skip)]
    path: Option<PathBuf>,
}

impl WorldFile {
    /// Create an empty description with default world settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a description from JSON text.
    pub fn from_json(text: &str) -> SimResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Read a description from disk. [`ConfigSource::persist`] writes back to the same path.
    pub fn load(path: &Path) -> SimResult<Self> {
        let text = std::fs::read_to_string(path)?;
        let mut file = Self::from_json(&text)?;
        file.path = Some(path.to_path_buf());
        Ok(file)
    }

    /// Render the description as pretty-printed JSON.
    pub fn to_json(&self) -> SimResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the description to `path`.
    pub fn write(&self, path: &Path) -> SimResult<()> {
        std::fs::write(path, self.to_json()? + "\n")?;
        Ok(())
    }

    /// The file this description was loaded from, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Redirect where [`ConfigSource::persist`] writes.
    pub fn set_path(&mut self, path: impl Into<PathBuf>) {
        self.path = Some(path.into());
    }

    /// Append a section and return its index.
    pub fn push(&mut self, kind: &str, parent: Option<usize>, config: ModelConfig) -> usize {
        self.sections.push(Section::new(kind, parent, config));
        self.sections.len() - 1
    }

    /// A small demonstration world: a robot carrying every sensor type,
    /// surrounded by walls and tagged beacons.
    pub fn example() -> Self {
        let mut file = Self::new();
        file.world = ModelConfig::new()
            .with("name", "example")
            .with("interval_sim", 100_i64)
            .with("interval_real", 100_i64)
            .with("size_x", 20.0)
            .with("size_y", 20.0);

        for (name, x, y, sx, sy) in [
            ("north", 0.0, 5.0, 10.0, 0.2),
            ("south", 0.0, -5.0, 10.0, 0.2),
            ("east", 5.0, 0.0, 0.2, 10.0),
            ("west", -5.0, 0.0, 0.2, 10.0),
        ] {
            file.push(
                "basic",
                None,
                ModelConfig::new()
                    .with("name", name)
                    .with("pose_x", x)
                    .with("pose_y", y)
                    .with("size_x", sx)
                    .with("size_y", sy)
                    .with("color", "gray"),
            );
        }
        for (id, x, y, color) in [(1_i64, 1.2, 0.3, "red"), (2, 3.0, -1.5, "green"), (3, -2.0, 2.0, "red")] {
            file.push(
                "basic",
                None,
                ModelConfig::new()
                    .with("name", format!("beacon{id}"))
                    .with("pose_x", x)
                    .with("pose_y", y)
                    .with("size_x", 0.2)
                    .with("size_y", 0.2)
                    .with("fiducial_return", id)
                    .with("color", color),
            );
        }

        let robot = file.push(
            "position",
            None,
            ModelConfig::new()
                .with("name", "robot")
                .with("pose_x", -1.0)
                .with("vx", 0.2)
                .with("va", 5.0),
        );
        let laser = file.push(
            "laser",
            Some(robot),
            ModelConfig::new().with("pose_x", 0.1).with("samples", 61_i64),
        );
        file.push("beacon-detector", Some(laser), ModelConfig::new());
        file.push("sonar", Some(robot), ModelConfig::new().with("scount", 8_i64));
        file.push("fiducial", Some(robot), ModelConfig::new());
        file.push(
            "blob-finder",
            Some(robot),
            ModelConfig::new()
                .with("channels", 2_i64)
                .with("channel[0]", "red")
                .with("channel[1]", "green"),
        );
        file.push(
            WINDOW_SECTION,
            None,
            ModelConfig::new().with("scale", 40.0),
        );
        file
    }
}

impl ConfigSource for WorldFile {
    fn world_config(&self) -> &ModelConfig {
        &self.world
    }

    fn sections(&self) -> &[Section] {
        &self.sections
    }

    fn save_world(&mut self, config: ModelConfig) {
        self.world = config;
    }

    fn save_section(&mut self, index: usize, config: ModelConfig) {
        if let Some(section) = self.sections.get_mut(index) {
            section.config = config;
        }
    }

    fn persist(&mut self) -> SimResult<()> {
        match &self.path {
            Some(path) => self.write(path),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn parses_minimal_description() {
        let file = WorldFile::from_json(
            r#"{ "world": { "name": "lab", "interval_sim": 50 },
                 "sections": [
                   { "type": "position", "config": { "name": "robot", "pose_x": 1.5 } },
                   { "type": "laser", "parent": 0 }
                 ] }"#,
        )
        .unwrap();
        assert_eq!(file.world.read_string("name", ""), "lab");
        assert_eq!(file.sections.len(), 2);
        assert_eq!(file.sections[1].parent, Some(0));
        assert!(file.sections[1].config.is_empty());
        assert_eq!(file.sections[0].config.read_float("pose_x", 0.0).unwrap(), 1.5);
    }

    #[test]
    fn missing_parts_default_to_empty() {
        let file = WorldFile::from_json("{}").unwrap();
        assert!(file.world.is_empty());
        assert!(file.sections.is_empty());
    }

    #[test]
    fn invalid_json_is_an_error() {
        assert!(WorldFile::from_json("{ not json").is_err());
        assert!(WorldFile::from_json(r#"{ "sections": [ { "parent": 0 } ] }"#).is_err());
    }

    #[test]
    fn write_then_load_round_trips() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("world.json");
        let file = WorldFile::example();
        file.write(&path).unwrap();
        let loaded = WorldFile::load(&path).unwrap();
        assert_eq!(loaded.world, file.world);
        assert_eq!(loaded.sections, file.sections);
        assert_eq!(loaded.path(), Some(path.as_path()));
    }

    #[test]
    fn persist_writes_saved_sections() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("world.json");
        let mut file = WorldFile::new();
        file.push("basic", None, ModelConfig::new());
        file.set_path(&path);
        file.save_section(0, ModelConfig::new().with("name", "box"));
        file.persist().unwrap();
        let loaded = WorldFile::load(&path).unwrap();
        assert_eq!(loaded.sections[0].config.read_string("name", ""), "box");
    }

    #[test]
    fn persist_without_path_is_a_no_op() {
        let mut file = WorldFile::example();
        assert!(file.persist().is_ok());
    }
}
