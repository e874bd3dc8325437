//! The photo collection of a session.
pub mod edit;
pub mod filter;

use crate::error::Result;
use crate::model::{LatLng, Photo};
use chrono::TimeDelta;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

pub use edit::{Change, KindChoice, PhotoEdit, normalize_tags};
pub use filter::{PanoramaChoice, PhotoFilter};

/// Told about removals so it can drop state kept per photo, such as map markers and
/// field-of-view overlays.
pub trait RegistryListener: Send + Sync {
    fn photo_removed(&self, id: &str);
}

/// Photos keyed by id, in insertion order.
#[derive(Default)]
pub struct PhotoRegistry {
    photos: Vec<Photo>,
    listeners: Vec<Arc<dyn RegistryListener>>,
}

impl std::fmt::Debug for PhotoRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhotoRegistry")
            .field("photos", &self.photos)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl PhotoRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, listener: Arc<dyn RegistryListener>) {
        self.listeners.push(listener);
    }

    /// A copy of the photos without the listeners, for work handed to another thread.
    /// Media bytes are shared, not copied.
    pub fn snapshot(&self) -> PhotoRegistry {
        PhotoRegistry {
            photos: self.photos.clone(),
            listeners: Vec::new(),
        }
    }

    /// Appends a photo and returns its id. A photo whose id is already taken gets a new one.
    pub fn insert(&mut self, mut photo: Photo) -> String {
        while self.contains(photo.id()) {
            photo.regenerate_id();
        }
        let id = photo.id().to_string();
        self.photos.push(photo);
        id
    }

    pub fn contains(&self, id: &str) -> bool {
        self.photos.iter().any(|p| p.id() == id)
    }

    pub fn get(&self, id: &str) -> Option<&Photo> {
        self.photos.iter().find(|p| p.id() == id)
    }

    pub(crate) fn get_mut(&mut self, id: &str) -> Option<&mut Photo> {
        self.photos.iter_mut().find(|p| p.id() == id)
    }

    pub(crate) fn iter_mut(&mut self) -> std::slice::IterMut<'_, Photo> {
        self.photos.iter_mut()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Photo> {
        self.photos.iter()
    }

    pub fn len(&self) -> usize {
        self.photos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.photos.is_empty()
    }

    /// Removes a photo and notifies listeners. Unknown ids are ignored.
    pub fn delete(&mut self, id: &str) -> Option<Photo> {
        let index = self.photos.iter().position(|p| p.id() == id)?;
        let photo = self.photos.remove(index);
        for listener in &self.listeners {
            listener.photo_removed(id);
        }
        debug!("Deleted photo {id}");
        Some(photo)
    }

    /// Moves a photo. Returns `false` for an unknown id.
    pub fn set_position(&mut self, id: &str, lat: f64, lng: f64) -> Result<bool> {
        let position = LatLng::new(lat, lng)?;
        Ok(self
            .get_mut(id)
            .map(|photo| photo.set_position(Some(position)))
            .is_some())
    }

    /// Applies an edit. Returns `false` for an unknown id.
    pub fn update(&mut self, id: &str, edit: &PhotoEdit) -> Result<bool> {
        match self.get_mut(id) {
            Some(photo) => edit.apply(photo).map(|_| true),
            None => Ok(false),
        }
    }

    /// A view of the photos matching `predicate`. The view can be iterated any number of times.
    pub fn filter<P>(&self, predicate: P) -> PhotoView<'_, P>
    where
        P: Fn(&Photo) -> bool,
    {
        PhotoView {
            photos: &self.photos,
            predicate,
        }
    }

    /// Shorthand for [`filter`](Self::filter) with a [`PhotoFilter`].
    pub fn search<'a>(&'a self, filter: &'a PhotoFilter) -> PhotoView<'a, impl Fn(&Photo) -> bool + 'a> {
        self.filter(move |photo| filter.matches(photo))
    }

    /// Photos that have a position.
    pub fn positioned(&self) -> impl Iterator<Item = &Photo> {
        self.photos.iter().filter(|p| p.position().is_some())
    }

    // --- Batch edits over a selection of ids. Each returns how many photos changed. ---

    /// Adds tags to every selected photo.
    pub fn add_tags<'t>(&mut self, ids: &[&str], tags: impl IntoIterator<Item = &'t str>) -> usize {
        let tags = normalize_tags(tags);
        if tags.is_empty() {
            return 0;
        }
        self.selected_mut(ids)
            .map(|photo| photo.tags.extend(tags.iter().cloned()))
            .count()
    }

    /// Moves the capture time of every selected, dated photo by `minutes`.
    pub fn shift_times(&mut self, ids: &[&str], minutes: i64) -> usize {
        if minutes == 0 {
            return 0;
        }
        let delta = TimeDelta::minutes(minutes);
        self.selected_mut(ids)
            .filter_map(|photo| photo.captured_at.as_mut())
            .map(|at| *at += delta)
            .count()
    }

    /// Gives every selected photo the license of `source_id`.
    pub fn copy_license(&mut self, source_id: &str, ids: &[&str]) -> usize {
        let Some(license) = self.get(source_id).map(|p| p.license.clone()) else {
            return 0;
        };
        self.selected_mut(ids)
            .map(|photo| photo.license.clone_from(&license))
            .count()
    }

    /// Flips `hidden` on every selected photo.
    pub fn toggle_hidden(&mut self, ids: &[&str]) -> usize {
        self.selected_mut(ids)
            .map(|photo| photo.hidden = !photo.hidden)
            .count()
    }

    fn selected_mut<'s>(&'s mut self, ids: &[&str]) -> impl Iterator<Item = &'s mut Photo> {
        let selected: HashSet<String> = ids.iter().map(|id| id.to_string()).collect();
        self.photos
            .iter_mut()
            .filter(move |photo| selected.contains(photo.id()))
    }
}

/// A lazily filtered, restartable view over a [`PhotoRegistry`].
pub struct PhotoView<'a, P> {
    photos: &'a [Photo],
    predicate: P,
}

impl<'a, P> PhotoView<'a, P>
where
    P: Fn(&Photo) -> bool,
{
    pub fn iter(&self) -> impl Iterator<Item = &'a Photo> + '_ {
        self.photos.iter().filter(|photo| (self.predicate)(*photo))
    }

    pub fn count(&self) -> usize {
        self.iter().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PhotoMapError;
    use chrono::{TimeZone, Utc};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<String>>);

    impl RegistryListener for Recorder {
        fn photo_removed(&self, id: &str) {
            self.0.lock().unwrap().push(id.to_string());
        }
    }

    fn registry() -> (PhotoRegistry, Vec<String>) {
        let mut registry = PhotoRegistry::new();
        let ids = ["a.jpg", "b.jpg", "c.jpg"]
            .into_iter()
            .map(|name| registry.insert(Photo::builder().name(name).build()))
            .collect();
        (registry, ids)
    }

    #[test]
    fn test_insert_keeps_ids_unique() {
        let mut registry = PhotoRegistry::new();
        let mut first = Photo::builder().name("a.jpg").build();
        first.set_id("ph_same".to_string());
        let mut second = first.clone();
        second.name = "b.jpg".to_string();

        assert_eq!(registry.insert(first), "ph_same");
        let second_id = registry.insert(second);
        assert_ne!(second_id, "ph_same");
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get(&second_id).unwrap().name, "b.jpg");
    }

    #[test]
    fn test_delete_notifies_and_ignores_unknown() {
        let (mut registry, ids) = registry();
        let recorder = Arc::new(Recorder::default());
        registry.subscribe(recorder.clone());

        assert!(registry.delete(&ids[1]).is_some());
        assert!(registry.delete("ph_nothere").is_none());
        assert_eq!(registry.len(), 2);
        assert_eq!(*recorder.0.lock().unwrap(), vec![ids[1].clone()]);
    }

    #[test]
    fn test_set_position() {
        let (mut registry, ids) = registry();
        assert!(registry.set_position(&ids[0], 25.0, 121.5).unwrap());
        assert!(!registry.set_position("ph_nothere", 25.0, 121.5).unwrap());
        let err = registry.set_position(&ids[0], 0.0, 181.0).unwrap_err();
        assert!(matches!(err, PhotoMapError::InvalidCoordinate { .. }));
        assert_eq!(registry.get(&ids[0]).unwrap().position().unwrap().lng(), 121.5);
        assert_eq!(registry.positioned().count(), 1);
    }

    #[test]
    fn test_filter_view_is_restartable() {
        let (registry, _) = registry();
        let view = registry.filter(|p| p.name != "b.jpg");
        assert_eq!(view.count(), 2);
        let names: Vec<&str> = view.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["a.jpg", "c.jpg"]);

        let filter = PhotoFilter::builder().query("B").build();
        assert_eq!(registry.search(&filter).count(), 1);
    }

    #[test]
    fn test_batch_edits() {
        let (mut registry, ids) = registry();
        let selection = [ids[0].as_str(), ids[2].as_str()];

        assert_eq!(registry.add_tags(&selection, ["trip", " ", "trip"]), 2);
        assert!(registry.get(&ids[2]).unwrap().tags.contains("trip"));
        assert!(registry.get(&ids[1]).unwrap().tags.is_empty());

        let start = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        registry.get_mut(&ids[0]).unwrap().captured_at = Some(start);
        assert_eq!(registry.shift_times(&selection, -90), 1, "Undated photos are left alone");
        assert_eq!(
            registry.get(&ids[0]).unwrap().captured_at,
            Some(Utc.with_ymd_and_hms(2024, 5, 1, 10, 30, 0).unwrap())
        );

        registry.get_mut(&ids[1]).unwrap().license = "CC0".to_string();
        assert_eq!(registry.copy_license(&ids[1], &selection), 2);
        assert_eq!(registry.get(&ids[0]).unwrap().license, "CC0");
        assert_eq!(registry.copy_license("ph_nothere", &selection), 0);

        assert_eq!(registry.toggle_hidden(&selection), 2);
        assert!(registry.get(&ids[0]).unwrap().hidden);
        registry.toggle_hidden(&[ids[0].as_str()]);
        assert!(!registry.get(&ids[0]).unwrap().hidden);
    }
}
