//! Configuration structs with defaults and RON persistence.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Deepest tile level any dataset may declare. HEALPix pixel indices at
/// this level still fit in a `u64`.
pub const MAX_TILE_LEVEL: u32 = 29;

/// Top-level renderer configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Tile cache and fetch scheduling.
    pub tiles: TileConfig,
    /// Camera used by the demo driver.
    pub view: ViewConfig,
    /// Datasets to render, in draw order.
    pub datasets: Vec<DatasetConfig>,
    /// Debug/development settings.
    pub debug: DebugConfig,
}

/// Tile cache and fetch scheduling settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TileConfig {
    /// Upper bound on fetches in flight at once.
    pub max_concurrent_fetches: usize,
    /// Errored tiles shallower than this level draw their children instead.
    pub shallow_error_level: u32,
    /// Fetch worker threads; 0 derives the count from the CPU count.
    pub fetch_threads: usize,
    /// Purge subtrees not rendered for this many frames; 0 disables.
    pub purge_after_frames: u64,
}

/// Demo camera settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ViewConfig {
    /// Vertical field of view in degrees.
    pub fov_degrees: f64,
    /// Width / height.
    pub aspect: f64,
    /// Right ascension (or longitude) the camera looks at, degrees.
    pub look_ra_deg: f64,
    /// Declination (or latitude) the camera looks at, degrees.
    pub look_dec_deg: f64,
    /// Number of frames the demo runs.
    pub frames: u64,
}

/// How a dataset's tiles are laid out.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Projection {
    /// HEALPix all-sky pixelization.
    Healpix,
    /// Gnomonic tangent-plane mosaic.
    Tangent,
}

/// What the dataset covers. Drives the LOD arc computation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum SurfaceKind {
    Sky,
    Planet,
    Earth,
}

/// Coordinate frame of HEALPix vertex data.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum ReferenceFrame {
    #[default]
    Equatorial,
    Galactic,
}

/// A serialisable dataset descriptor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DatasetConfig {
    pub name: String,
    pub projection: Projection,
    pub surface: SurfaceKind,
    pub frame: ReferenceFrame,
    /// Angular size of the level-0 tile, degrees.
    pub base_degrees: f64,
    /// Deepest level in the pyramid; level 0 is the root.
    pub levels: u32,
    /// URL template with `{level}`, `{dir}`, `{index}`, `{ext}`, `{x}`, `{y}`
    /// or `{quadkey}` placeholders.
    pub url_template: String,
    /// Space-separated extension list, e.g. `"png fits"`.
    pub extensions: String,
    /// Optional elevation grid template, same placeholders.
    pub elevation_template: Option<String>,
    /// Tile rows are numbered from the south.
    pub bottoms_up: bool,
    /// Payload is delimited catalog rows instead of imagery.
    pub catalog: bool,
    /// Column delimiter for catalog rows.
    pub delimiter: char,
    /// Tangent-plane horizontal offset, degrees.
    pub offset_x: f64,
    /// Tangent-plane vertical offset, degrees.
    pub offset_y: f64,
    /// Tangent-plane width divisor.
    pub width_factor: f64,
    /// Tangent-plane centre, degrees `(lat, lng)`.
    pub center: (f64, f64),
    /// Tangent-plane rotation about the view axis, degrees.
    pub rotation_deg: f64,
    /// Pixel edge length of one tile.
    pub tile_pixels: u32,
    /// Elevation units per sphere radius; altitudes divide by this unless
    /// asked for in meters.
    pub dem_scale_factor: f64,
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level override (e.g., "debug", "info", "warn").
    pub log_level: String,
    /// Write a JSON log file next to the config.
    pub file_logging: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tiles: TileConfig::default(),
            view: ViewConfig::default(),
            datasets: vec![DatasetConfig::default()],
            debug: DebugConfig::default(),
        }
    }
}

impl Default for TileConfig {
    fn default() -> Self {
        Self {
            max_concurrent_fetches: 8,
            shallow_error_level: 3,
            fetch_threads: 0,
            purge_after_frames: 0,
        }
    }
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            fov_degrees: 60.0,
            aspect: 16.0 / 9.0,
            look_ra_deg: 0.0,
            look_dec_deg: 0.0,
            frames: 120,
        }
    }
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            name: "dss".to_string(),
            projection: Projection::Healpix,
            surface: SurfaceKind::Sky,
            frame: ReferenceFrame::Equatorial,
            base_degrees: 180.0,
            levels: 9,
            url_template: "tiles/Norder{level}/Dir{dir}/Npix{index}{ext}".to_string(),
            extensions: "jpeg".to_string(),
            elevation_template: None,
            bottoms_up: false,
            catalog: false,
            delimiter: '\t',
            offset_x: 0.0,
            offset_y: 0.0,
            width_factor: 2.0,
            center: (0.0, 0.0),
            rotation_deg: 0.0,
            tile_pixels: 512,
            dem_scale_factor: 6_371_000.0,
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            file_logging: false,
        }
    }
}

impl DatasetConfig {
    /// Reject descriptors that cannot produce a tile tree.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fail = |reason| {
            Err(ConfigError::InvalidDataset {
                name: self.name.clone(),
                reason,
            })
        };
        if self.tile_pixels == 0 {
            return fail("tile_pixels must be non-zero");
        }
        if !(self.base_degrees > 0.0 && self.base_degrees.is_finite()) {
            return fail("base_degrees must be positive");
        }
        if self.levels > MAX_TILE_LEVEL {
            return fail("levels must not exceed 29");
        }
        if self.url_template.is_empty() {
            return fail("url_template is empty");
        }
        if self.width_factor == 0.0 {
            return fail("width_factor must be non-zero");
        }
        Ok(())
    }
}

/// Platform config directory for skyweave, if the platform has one.
pub fn default_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("skyweave"))
}

// --- Load / Save / Reload ---

impl Config {
    /// Load config from the given directory, or create a default config file.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join("config.ron");

        if config_path.exists() {
            let config = Self::read(&config_path)?;
            log::info!("Loaded config from {}", config_path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", config_path.display());
            Ok(config)
        }
    }

    /// Save config to the given directory as `config.ron`.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(ConfigError::WriteError)?;

        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(4)
            .separate_tuple_members(true)
            .enumerate_arrays(false);
        let serialized =
            ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::SerializeError)?;

        std::fs::write(config_dir.join("config.ron"), serialized).map_err(ConfigError::WriteError)
    }

    /// Hot-reload: returns `Some(new_config)` if the file changed, `None` otherwise.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let new_config = Self::read(&config_dir.join("config.ron"))?;
        if &new_config != self {
            log::info!("Config reloaded with changes");
            Ok(Some(new_config))
        } else {
            Ok(None)
        }
    }

    /// Validate every dataset entry.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.datasets.iter().try_for_each(DatasetConfig::validate)
    }

    fn read(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        ron::from_str(&contents).map_err(ConfigError::ParseError)
    }
}
