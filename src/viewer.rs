//! Screen state for the image viewer.
//!
//! Everything here runs on the UI thread. Network work happens elsewhere and
//! reports back through [`Viewer::complete_fetch`] and
//! [`Viewer::complete_decode`], tagged with the sequence number handed out by
//! [`Viewer::begin_fetch`].

use std::fmt;
use std::time::{Duration, Instant};

use rand::Rng;

use crate::api::{CategoryError, CategorySet, Classification, FetchError, ImageDescriptor};
use crate::media::Picture;

pub const ALL_CATEGORIES: &str = "all";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Category {
    #[default]
    All,
    Named(String),
}

impl Category {
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case(ALL_CATEGORIES) {
            Category::All
        } else {
            Category::Named(trimmed.to_string())
        }
    }

    pub fn label(&self) -> String {
        match self {
            Category::All => "All Categories".to_string(),
            Category::Named(name) => capitalize(name),
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Category::All => f.write_str(ALL_CATEGORIES),
            Category::Named(name) => f.write_str(name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Selection {
    pub classification: Classification,
    pub category: Category,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ImageResult {
    #[default]
    Pending,
    Ready(ImageDescriptor),
    Failed(FetchError),
}

impl ImageResult {
    pub fn url(&self) -> Option<&str> {
        match self {
            ImageResult::Ready(image) => Some(image.url.as_str()),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&FetchError> {
        match self {
            ImageResult::Failed(err) => Some(err),
            _ => None,
        }
    }
}

/// Resolved request parameters for one fetch cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
    pub seq: u64,
    pub classification: Classification,
    pub category: String,
}

pub struct Viewer {
    categories: CategorySet,
    selection: Selection,
    result: ImageResult,
    picture: Option<Picture>,
    loading: bool,
    latest_seq: u64,
    revealed_at: Option<Instant>,
}

impl Viewer {
    pub fn new(selection: Selection) -> Self {
        Self {
            categories: CategorySet::default(),
            selection,
            result: ImageResult::Pending,
            picture: None,
            loading: false,
            latest_seq: 0,
            revealed_at: None,
        }
    }

    pub fn categories(&self) -> &CategorySet {
        &self.categories
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn result(&self) -> &ImageResult {
        &self.result
    }

    pub fn picture(&self) -> Option<&Picture> {
        self.picture.as_ref()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn latest_seq(&self) -> u64 {
        self.latest_seq
    }

    /// Stores the category list. A failed load leaves both lists empty and
    /// returns the notice to show the user.
    pub fn apply_categories(
        &mut self,
        result: std::result::Result<CategorySet, CategoryError>,
    ) -> Option<String> {
        match result {
            Ok(set) => {
                tracing::info!(sfw = set.sfw.len(), nsfw = set.nsfw.len(), "categories loaded");
                self.categories = set;
                None
            }
            Err(err) => {
                tracing::warn!(error = %err, "category load failed");
                self.categories = CategorySet::default();
                Some(format!(
                    "Could not fetch categories ({err}). Please try again later."
                ))
            }
        }
    }

    pub fn select_classification(&mut self, classification: Classification) {
        self.selection.classification = classification;
    }

    pub fn select_category(&mut self, category: Category) {
        self.selection.category = category;
    }

    /// Moves the selection `delta` entries through the picker list, wrapping
    /// at either end. A selection missing from the list restarts at "all".
    pub fn cycle_category(&mut self, delta: isize) -> &Category {
        let entries = self.visible_categories();
        let len = entries.len() as isize;
        let current = entries
            .iter()
            .position(|candidate| *candidate == self.selection.category)
            .unwrap_or(0) as isize;
        let next = (current + delta).rem_euclid(len) as usize;
        if let Some(category) = entries.into_iter().nth(next) {
            self.selection.category = category;
        }
        &self.selection.category
    }

    /// Picker entries for the current classification: "all" first, then the
    /// names the service listed for it.
    pub fn visible_categories(&self) -> Vec<Category> {
        std::iter::once(Category::All)
            .chain(
                self.categories
                    .list(self.selection.classification)
                    .iter()
                    .map(|name| Category::Named(name.clone())),
            )
            .collect()
    }

    /// Starts a fetch cycle for the current selection.
    ///
    /// Returns the parameters the network request must use, or the
    /// precondition failure when "all" is selected before any categories are
    /// known. In the failure case no request may be issued.
    pub fn begin_fetch<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
    ) -> std::result::Result<FetchTicket, FetchError> {
        let (classification, category) = match &self.selection.category {
            Category::All => {
                if self.categories.is_empty() {
                    let err = FetchError::CategoriesUnavailable;
                    self.result = ImageResult::Failed(err.clone());
                    self.picture = None;
                    self.loading = false;
                    return Err(err);
                }
                let index = rng.gen_range(0..self.categories.total());
                self.categories
                    .entry(index)
                    .map(|(classification, name)| (classification, name.to_string()))
                    .ok_or(FetchError::CategoriesUnavailable)?
            }
            Category::Named(name) => (self.selection.classification, name.clone()),
        };

        self.latest_seq = self.latest_seq.wrapping_add(1);
        self.result = ImageResult::Pending;
        self.picture = None;
        self.revealed_at = None;
        self.loading = true;

        tracing::debug!(
            seq = self.latest_seq,
            classification = %classification,
            category = %category,
            "fetch started"
        );

        Ok(FetchTicket {
            seq: self.latest_seq,
            classification,
            category,
        })
    }

    /// Records the image endpoint outcome. Returns false when a newer fetch
    /// has started since `seq` was issued; the outcome is then dropped.
    pub fn complete_fetch(
        &mut self,
        seq: u64,
        result: std::result::Result<ImageDescriptor, FetchError>,
    ) -> bool {
        if !self.is_current(seq) {
            tracing::debug!(seq, latest = self.latest_seq, "dropping stale image response");
            return false;
        }
        self.picture = None;
        match result {
            Ok(image) => {
                tracing::info!(seq, url = %image.url, "image located");
                self.result = ImageResult::Ready(image);
            }
            Err(err) => {
                tracing::warn!(seq, error = %err, "image fetch failed");
                self.result = ImageResult::Failed(err);
                self.loading = false;
            }
        }
        true
    }

    /// Records the download/decode outcome for the image located by `seq`.
    pub fn complete_decode(
        &mut self,
        seq: u64,
        result: std::result::Result<Picture, FetchError>,
    ) -> bool {
        if !self.is_current(seq) || !matches!(self.result, ImageResult::Ready(_)) {
            return false;
        }
        match result {
            Ok(picture) => {
                self.picture = Some(picture);
                self.revealed_at = Some(Instant::now());
            }
            Err(err) => {
                tracing::warn!(seq, error = %err, "image decode failed");
                self.picture = None;
                self.result = ImageResult::Failed(err);
            }
        }
        self.loading = false;
        true
    }

    fn is_current(&self, seq: u64) -> bool {
        seq == self.latest_seq && self.loading
    }

    /// Fade-in progress of the current picture, from 0.0 to 1.0.
    pub fn opacity(&self, fade: Duration) -> f32 {
        let Some(revealed_at) = self.revealed_at else {
            return 0.0;
        };
        if fade.is_zero() {
            return 1.0;
        }
        (revealed_at.elapsed().as_secs_f32() / fade.as_secs_f32()).clamp(0.0, 1.0)
    }

    pub fn is_fading(&self, fade: Duration) -> bool {
        self.picture.is_some() && self.opacity(fade) < 1.0
    }
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn viewer_with(set: CategorySet, selection: Selection) -> Viewer {
        let mut viewer = Viewer::new(selection);
        assert!(viewer.apply_categories(Ok(set)).is_none());
        viewer
    }

    fn sample_set() -> CategorySet {
        CategorySet {
            sfw: vec!["maid".into(), "waifu".into()],
            nsfw: vec!["neko".into()],
        }
    }

    fn named(classification: Classification, name: &str) -> Selection {
        Selection {
            classification,
            category: Category::Named(name.into()),
        }
    }

    fn descriptor(url: &str) -> ImageDescriptor {
        ImageDescriptor {
            url: url.into(),
            file: None,
        }
    }

    fn picture() -> Picture {
        Picture::from_rgba(1, 1, vec![255, 0, 0, 255]).unwrap()
    }

    #[test]
    fn named_selection_is_used_verbatim() {
        let mut viewer = viewer_with(sample_set(), named(Classification::Nsfw, "maid"));
        let mut rng = StdRng::seed_from_u64(7);
        let ticket = viewer.begin_fetch(&mut rng).unwrap();
        assert_eq!(ticket.classification, Classification::Nsfw);
        assert_eq!(ticket.category, "maid");
        assert!(viewer.is_loading());
    }

    #[test]
    fn all_without_categories_fails_without_ticket() {
        let mut viewer = Viewer::new(Selection::default());
        let notice = viewer.apply_categories(Err(CategoryError::Network("offline".into())));
        assert!(notice.is_some());
        assert!(viewer.categories().is_empty());

        let mut rng = StdRng::seed_from_u64(1);
        let err = viewer.begin_fetch(&mut rng).unwrap_err();
        assert_eq!(err, FetchError::CategoriesUnavailable);
        assert_eq!(viewer.result(), &ImageResult::Failed(err));
        assert!(!viewer.is_loading());
        assert_eq!(viewer.latest_seq(), 0);
    }

    #[test]
    fn random_pick_stays_inside_known_categories() {
        let set = sample_set();
        let mut viewer = viewer_with(set.clone(), Selection::default());
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..200 {
            let ticket = viewer.begin_fetch(&mut rng).unwrap();
            assert!(set.list(ticket.classification).contains(&ticket.category));
        }
    }

    #[test]
    fn random_pick_derives_classification_from_source_list() {
        let set = CategorySet {
            sfw: vec![],
            nsfw: vec!["neko".into()],
        };
        let mut viewer = viewer_with(
            set,
            Selection {
                classification: Classification::Sfw,
                category: Category::All,
            },
        );
        let mut rng = StdRng::seed_from_u64(3);
        let ticket = viewer.begin_fetch(&mut rng).unwrap();
        assert_eq!(ticket.classification, Classification::Nsfw);
        assert_eq!(ticket.category, "neko");
    }

    #[test]
    fn loading_spans_fetch_and_decode() {
        let mut viewer = viewer_with(sample_set(), named(Classification::Sfw, "maid"));
        let mut rng = StdRng::seed_from_u64(0);
        assert!(!viewer.is_loading());
        let ticket = viewer.begin_fetch(&mut rng).unwrap();
        assert!(viewer.is_loading());

        assert!(viewer.complete_fetch(ticket.seq, Ok(descriptor("https://x/img.png"))));
        assert_eq!(viewer.result().url(), Some("https://x/img.png"));
        assert!(viewer.is_loading());

        assert!(viewer.complete_decode(ticket.seq, Ok(picture())));
        assert!(!viewer.is_loading());
        assert!(viewer.picture().is_some());
    }

    #[test]
    fn fetch_failure_clears_url_and_loading() {
        let mut viewer = viewer_with(sample_set(), named(Classification::Sfw, "maid"));
        let mut rng = StdRng::seed_from_u64(0);
        let first = viewer.begin_fetch(&mut rng).unwrap();
        viewer.complete_fetch(first.seq, Ok(descriptor("https://x/1.png")));
        viewer.complete_decode(first.seq, Ok(picture()));

        let second = viewer.begin_fetch(&mut rng).unwrap();
        viewer.complete_fetch(
            second.seq,
            Err(FetchError::InvalidFormat("response has no url".into())),
        );
        assert_eq!(viewer.result().url(), None);
        assert!(viewer.picture().is_none());
        assert!(!viewer.is_loading());
        assert!(viewer
            .result()
            .error()
            .unwrap()
            .to_string()
            .contains("invalid data format"));
    }

    #[test]
    fn decode_failure_replaces_ready_result() {
        let mut viewer = viewer_with(sample_set(), named(Classification::Sfw, "maid"));
        let mut rng = StdRng::seed_from_u64(0);
        let ticket = viewer.begin_fetch(&mut rng).unwrap();
        viewer.complete_fetch(ticket.seq, Ok(descriptor("https://x/broken.png")));
        viewer.complete_decode(ticket.seq, Err(FetchError::Decode("truncated".into())));
        assert!(matches!(viewer.result(), ImageResult::Failed(FetchError::Decode(_))));
        assert!(!viewer.is_loading());
    }

    #[test]
    fn newer_fetch_wins_over_late_older_response() {
        let mut viewer = viewer_with(sample_set(), named(Classification::Sfw, "maid"));
        let mut rng = StdRng::seed_from_u64(0);
        let old = viewer.begin_fetch(&mut rng).unwrap();
        let new = viewer.begin_fetch(&mut rng).unwrap();

        assert!(viewer.complete_fetch(new.seq, Ok(descriptor("https://x/new.png"))));
        assert!(!viewer.complete_fetch(old.seq, Ok(descriptor("https://x/old.png"))));
        assert_eq!(viewer.result().url(), Some("https://x/new.png"));
        assert!(!viewer.complete_decode(old.seq, Ok(picture())));
        assert!(viewer.is_loading());
    }

    #[test]
    fn visible_categories_follow_classification() {
        let mut viewer = viewer_with(sample_set(), Selection::default());
        assert_eq!(viewer.visible_categories().len(), 3);
        viewer.select_classification(Classification::Nsfw);
        assert_eq!(
            viewer.visible_categories(),
            vec![Category::All, Category::Named("neko".into())]
        );
    }

    #[test]
    fn category_parsing_and_labels() {
        assert_eq!(Category::parse(" ALL "), Category::All);
        assert_eq!(Category::parse("waifu").label(), "Waifu");
        assert_eq!(Category::All.to_string(), "all");
    }

    #[test]
    fn opacity_is_zero_before_reveal() {
        let viewer = Viewer::new(Selection::default());
        assert_eq!(viewer.opacity(Duration::from_millis(300)), 0.0);
    }

    fn revealed_viewer() -> Viewer {
        let mut viewer = viewer_with(sample_set(), named(Classification::Sfw, "maid"));
        let mut rng = StdRng::seed_from_u64(0);
        let ticket = viewer.begin_fetch(&mut rng).unwrap();
        viewer.complete_fetch(ticket.seq, Ok(descriptor("https://x/img.png")));
        viewer.complete_decode(ticket.seq, Ok(picture()));
        viewer
    }

    #[test]
    fn zero_fade_is_fully_opaque_at_once() {
        let viewer = revealed_viewer();
        assert_eq!(viewer.opacity(Duration::ZERO), 1.0);
        assert!(!viewer.is_fading(Duration::ZERO));
    }

    #[test]
    fn opacity_ramps_to_one_after_fade() {
        let viewer = revealed_viewer();
        assert!(viewer.opacity(Duration::from_secs(3600)) < 1.0);
        assert!(viewer.is_fading(Duration::from_secs(3600)));

        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(viewer.opacity(Duration::from_millis(10)), 1.0);
        assert!(!viewer.is_fading(Duration::from_millis(10)));
    }

    #[test]
    fn cycle_category_wraps_through_picker() {
        let mut viewer = viewer_with(sample_set(), Selection::default());
        assert_eq!(viewer.cycle_category(1), &Category::Named("maid".into()));
        assert_eq!(viewer.cycle_category(1), &Category::Named("waifu".into()));
        assert_eq!(viewer.cycle_category(1), &Category::All);
        assert_eq!(viewer.cycle_category(-1), &Category::Named("waifu".into()));
    }

    #[test]
    fn cycle_category_restarts_from_unlisted_selection() {
        let mut viewer = viewer_with(sample_set(), named(Classification::Nsfw, "maid"));
        assert_eq!(viewer.cycle_category(1), &Category::Named("neko".into()));
    }

    #[test]
    fn cycle_category_without_categories_stays_on_all() {
        let mut viewer = Viewer::new(Selection::default());
        assert_eq!(viewer.cycle_category(3), &Category::All);
    }
}
