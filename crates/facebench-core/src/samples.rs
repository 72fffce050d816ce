//! Labelled, preprocessed image samples for closed-set evaluation.

use facebench_img::{GrayImage, ImageError, ImageSource, Label, LabelMap, Preprocessor, SampleRecord};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SampleError {
    #[error("failed to load sample {key}")]
    Image {
        key: String,
        #[source]
        source: ImageError,
    },
    #[error("{images} images but {labels} labels")]
    LabelCountMismatch { images: usize, labels: usize },
    #[error("sample set is empty")]
    Empty,
}

/// Images with parallel identity labels. Labels are dense and assigned in
/// first-seen order.
#[derive(Debug, Clone)]
pub struct SampleSet {
    images: Vec<GrayImage>,
    labels: Vec<Label>,
    names: LabelMap,
}

impl SampleSet {
    pub fn new(images: Vec<GrayImage>, labels: Vec<Label>, names: LabelMap) -> Result<Self, SampleError> {
        if images.len() != labels.len() {
            return Err(SampleError::LabelCountMismatch {
                images: images.len(),
                labels: labels.len(),
            });
        }
        Ok(Self { images, labels, names })
    }

    /// Load and preprocess the images of `records`, keeping at most
    /// `max_images` of them when a cap is given.
    pub fn load(
        records: &[SampleRecord],
        source: &dyn ImageSource,
        preprocessor: &Preprocessor,
        max_images: Option<usize>,
    ) -> Result<Self, SampleError> {
        let take = max_images.unwrap_or(records.len()).min(records.len());
        if take == 0 {
            return Err(SampleError::Empty);
        }
        if take < records.len() {
            tracing::info!(total = records.len(), kept = take, "sample list truncated");
        }

        let mut names = LabelMap::new();
        let mut images = Vec::with_capacity(take);
        let mut labels = Vec::with_capacity(take);
        for record in &records[..take] {
            let image = source.load(&record.path).map_err(|source| SampleError::Image {
                key: record.path.clone(),
                source,
            })?;
            images.push(preprocessor.process(&image));
            labels.push(names.label_for(&record.identity));
        }
        tracing::info!(
            images = images.len(),
            persons = names.len(),
            preprocess = %preprocessor.kind(),
            crop = preprocessor.crop(),
            "samples loaded"
        );
        Self::new(images, labels, names)
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn image(&self, index: usize) -> Option<&GrayImage> {
        self.images.get(index)
    }

    pub fn label(&self, index: usize) -> Option<Label> {
        self.labels.get(index).copied()
    }

    pub fn labels(&self) -> &[Label] {
        &self.labels
    }

    /// Number of distinct identities.
    pub fn persons(&self) -> usize {
        self.names.len()
    }

    pub fn names(&self) -> &LabelMap {
        &self.names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use facebench_img::{MemoryImageSource, PreprocessKind};
    use image::Luma;

    fn source() -> MemoryImageSource {
        let mut src = MemoryImageSource::new();
        for (i, key) in ["alice/x.jpg", "bob/y.jpg", "alice/z.jpg"].iter().enumerate() {
            src.insert(*key, GrayImage::from_pixel(4, 4, Luma([i as u8 * 50])));
        }
        src
    }

    fn records(keys: &[&str]) -> Vec<SampleRecord> {
        keys.iter()
            .map(|k| SampleRecord {
                path: k.to_string(),
                identity: facebench_img::dataset::identity_of(k).to_string(),
            })
            .collect()
    }

    #[test]
    fn test_load_assigns_first_seen_labels() {
        let recs = records(&["alice/x.jpg", "bob/y.jpg", "alice/z.jpg"]);
        let set = SampleSet::load(&recs, &source(), &Preprocessor::default(), None).unwrap();
        assert_eq!(set.labels(), &[0, 1, 0]);
        assert_eq!(set.persons(), 2);
        assert_eq!(set.names().name(1), Some("bob"));
    }

    #[test]
    fn test_load_applies_cap_and_preprocessing() {
        let recs = records(&["alice/x.jpg", "bob/y.jpg", "alice/z.jpg"]);
        let pre = Preprocessor::new(PreprocessKind::None, 1);
        let set = SampleSet::load(&recs, &source(), &pre, Some(2)).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.image(0).unwrap().dimensions(), (2, 2));
    }

    #[test]
    fn test_missing_image_is_reported() {
        let recs = records(&["carol/q.jpg"]);
        let err = SampleSet::load(&recs, &source(), &Preprocessor::default(), None).unwrap_err();
        assert!(matches!(err, SampleError::Image { ref key, .. } if key == "carol/q.jpg"));
    }

    #[test]
    fn test_empty_list_rejected() {
        assert!(matches!(
            SampleSet::load(&[], &source(), &Preprocessor::default(), None),
            Err(SampleError::Empty)
        ));
    }

    #[test]
    fn test_new_checks_lengths() {
        let err = SampleSet::new(vec![GrayImage::new(1, 1)], vec![], LabelMap::new()).unwrap_err();
        assert!(matches!(err, SampleError::LabelCountMismatch { images: 1, labels: 0 }));
    }
}
