use anyhow::{Context, Result};
use facebench_core::{
    ClassifierKind, ExtractorKind, ExtractorParams, FilterKind, FilterParams, PredictorMode, TrainMethod,
};
use facebench_img::PreprocessKind;
use serde::Deserialize;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Run configuration: defaults, then an optional TOML file, then
/// `FACEBENCH_*` environment variables. Command-line flags are applied last
/// by the caller.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Sample list file for `cross` and `roc`.
    pub samples: PathBuf,
    /// LFW root directory (holding the pair lists) for `pairs`.
    pub lfw_root: PathBuf,
    /// Directory image keys are resolved against; defaults to the sample
    /// list's directory or the LFW root.
    pub image_root: Option<PathBuf>,
    pub preprocess: PreprocessKind,
    /// Border margin removed before preprocessing.
    pub crop: u32,
    pub folds: usize,
    /// One sample in `ratio` is drawn into each ROC trial's test set.
    pub ratio: u32,
    pub iterations: usize,
    /// Cap on loaded samples; 0 loads everything.
    pub max_images: usize,
    pub skip: usize,
    pub train_method: TrainMethod,
    pub extractor: ExtractorKind,
    pub filter: FilterKind,
    pub classifier: ClassifierKind,
    pub mode: PredictorMode,
    pub grid: [u32; 2],
    pub pixel_size: [u32; 2],
    pub projection_dim: usize,
    /// Fixed RNG seed; drawn from entropy when unset.
    pub seed: Option<u64>,
    /// Where `.roc` files are written.
    pub roc_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            samples: PathBuf::from("samples.txt"),
            lfw_root: PathBuf::from("data/lfw-deepfunneled"),
            image_root: None,
            preprocess: PreprocessKind::None,
            crop: 0,
            folds: 4,
            ratio: 4,
            iterations: 100,
            max_images: 400,
            skip: 80,
            train_method: TrainMethod::Dev,
            extractor: ExtractorKind::LbpUniform,
            filter: FilterKind::None,
            classifier: ClassifierKind::HistHellinger,
            mode: PredictorMode::Verifier,
            grid: [8, 8],
            pixel_size: [120, 120],
            projection_dim: FilterParams::default().projection_dim,
            seed: None,
            roc_dir: PathBuf::from("."),
        }
    }
}

impl Config {
    /// Defaults, overlaid with `file` when given, then with the environment.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let mut config = match file {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("reading config {}", path.display()))?;
                toml::from_str(&text).with_context(|| format!("parsing config {}", path.display()))?
            }
            None => Config::default(),
        };
        config.apply_env()?;
        Ok(config)
    }

    /// Override fields from `FACEBENCH_*` environment variables.
    pub fn apply_env(&mut self) -> Result<()> {
        if let Ok(v) = std::env::var("FACEBENCH_SAMPLES") {
            self.samples = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("FACEBENCH_LFW_ROOT") {
            self.lfw_root = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("FACEBENCH_IMAGE_ROOT") {
            self.image_root = Some(PathBuf::from(v));
        }
        if let Ok(v) = std::env::var("FACEBENCH_ROC_DIR") {
            self.roc_dir = PathBuf::from(v);
        }
        env_override("FACEBENCH_PREPROCESS", &mut self.preprocess)?;
        env_override("FACEBENCH_CROP", &mut self.crop)?;
        env_override("FACEBENCH_FOLDS", &mut self.folds)?;
        env_override("FACEBENCH_RATIO", &mut self.ratio)?;
        env_override("FACEBENCH_ITERATIONS", &mut self.iterations)?;
        env_override("FACEBENCH_MAX_IMAGES", &mut self.max_images)?;
        env_override("FACEBENCH_SKIP", &mut self.skip)?;
        env_override("FACEBENCH_TRAIN_METHOD", &mut self.train_method)?;
        env_override("FACEBENCH_EXTRACTOR", &mut self.extractor)?;
        env_override("FACEBENCH_FILTER", &mut self.filter)?;
        env_override("FACEBENCH_CLASSIFIER", &mut self.classifier)?;
        env_override("FACEBENCH_PROJECTION_DIM", &mut self.projection_dim)?;
        if let Some(seed) = env_value("FACEBENCH_SEED")? {
            self.seed = Some(seed);
        }
        Ok(())
    }

    pub fn extractor_params(&self) -> ExtractorParams {
        ExtractorParams {
            pixel_size: (self.pixel_size[0], self.pixel_size[1]),
            grid: (self.grid[0], self.grid[1]),
        }
    }

    /// Projection parameters; the projection seed follows the run seed.
    pub fn filter_params(&self) -> FilterParams {
        let defaults = FilterParams::default();
        FilterParams {
            projection_dim: self.projection_dim,
            seed: self.seed.unwrap_or(defaults.seed),
        }
    }

    /// Sample cap, `None` when unlimited.
    pub fn max_images(&self) -> Option<usize> {
        (self.max_images > 0).then_some(self.max_images)
    }

    /// Directory image keys of the sample list resolve against.
    pub fn sample_image_root(&self) -> PathBuf {
        self.image_root.clone().unwrap_or_else(|| {
            self.samples
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default()
        })
    }

    pub fn pair_image_root(&self) -> PathBuf {
        self.image_root.clone().unwrap_or_else(|| self.lfw_root.clone())
    }
}

fn env_value<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: Display,
{
    match std::env::var(key) {
        Ok(v) => v
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("{key}={v}: {e}")),
        Err(_) => Ok(None),
    }
}

fn env_override<T>(key: &str, slot: &mut T) -> Result<()>
where
    T: FromStr,
    T::Err: Display,
{
    if let Some(value) = env_value(key)? {
        *slot = value;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let c = Config::default();
        assert_eq!(c.folds, 4);
        assert_eq!(c.max_images(), Some(400));
        assert_eq!(c.extractor_params(), ExtractorParams::default());
        assert_eq!(c.sample_image_root(), PathBuf::from(""));
    }

    #[test]
    fn test_toml_overlay_keeps_unset_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
samples = "/data/yale/yale.txt"
folds = 10
extractor = "Lbp"
classifier = "4"
preprocess = "clahe"
max_images = 0
"#
        )
        .unwrap();
        let c = Config::load(Some(file.path())).unwrap();
        assert_eq!(c.folds, 10);
        assert_eq!(c.extractor, ExtractorKind::Lbp);
        assert_eq!(c.classifier, ClassifierKind::HistChiSquare);
        assert_eq!(c.preprocess, PreprocessKind::Clahe);
        assert_eq!(c.max_images(), None);
        assert_eq!(c.skip, 80);
        assert_eq!(c.sample_image_root(), PathBuf::from("/data/yale"));
    }

    #[test]
    fn test_unknown_key_rejected() {
        assert!(toml::from_str::<Config>("fold = 3").is_err());
    }

    #[test]
    fn test_env_value_parsing() {
        std::env::set_var("FACEBENCH_TEST_FOLDS", " 7 ");
        assert_eq!(env_value::<usize>("FACEBENCH_TEST_FOLDS").unwrap(), Some(7));
        std::env::set_var("FACEBENCH_TEST_EXTRACTOR", "wld");
        assert!(env_value::<ExtractorKind>("FACEBENCH_TEST_EXTRACTOR").is_err());
        assert_eq!(env_value::<u32>("FACEBENCH_TEST_UNSET").unwrap(), None);
    }
}
