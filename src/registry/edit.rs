use crate::error::Result;
use crate::model::{LatLng, Photo, PhotoKind};
use bon::Builder;
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

/// Sets or clears an optional field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Change<T> {
    Set(T),
    Clear,
}

/// Kind override of a [`PhotoEdit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KindChoice {
    /// Follow the pixel size.
    Auto,
    Fixed(PhotoKind),
}

/// A set of changes to one photo. Fields left `None` are not touched.
#[derive(Debug, Clone, Default, Builder)]
pub struct PhotoEdit {
    #[builder(into)]
    pub title: Option<String>,
    #[builder(into)]
    pub description: Option<String>,
    #[builder(into)]
    pub author: Option<String>,
    #[builder(into)]
    pub license: Option<String>,
    /// Replaces the tag set.
    pub tags: Option<BTreeSet<String>>,
    pub kind: Option<KindChoice>,
    /// `(lat, lng)`; validated before anything is applied.
    pub position: Option<Change<(f64, f64)>>,
    pub captured_at: Option<Change<DateTime<Utc>>>,
    pub bearing: Option<Change<f64>>,
    pub yaw: Option<f64>,
    pub pitch: Option<f64>,
    pub hidden: Option<bool>,
    /// Freshly measured pixel size.
    pub dimensions: Option<(u32, u32)>,
}

impl PhotoEdit {
    /// Applies the edit, or changes nothing when the new position is out of range.
    pub fn apply(&self, photo: &mut Photo) -> Result<()> {
        let position = match self.position {
            Some(Change::Set((lat, lng))) => Some(Some(LatLng::new(lat, lng)?)),
            Some(Change::Clear) => Some(None),
            None => None,
        };

        if let Some(title) = &self.title {
            photo.title = title.trim().to_string();
        }
        if let Some(description) = &self.description {
            photo.description = description.trim().to_string();
        }
        if let Some(author) = &self.author {
            photo.author = author.trim().to_string();
        }
        if let Some(license) = &self.license {
            photo.license = license.trim().to_string();
        }
        if let Some(tags) = &self.tags {
            photo.tags = normalize_tags(tags.iter().map(String::as_str));
        }
        if let Some(position) = position {
            photo.set_position(position);
        }
        match self.captured_at {
            Some(Change::Set(at)) => photo.captured_at = Some(at),
            Some(Change::Clear) => photo.captured_at = None,
            None => {}
        }
        match self.bearing {
            Some(Change::Set(bearing)) => photo.set_bearing(Some(bearing)),
            Some(Change::Clear) => photo.set_bearing(None),
            None => {}
        }
        if let Some(yaw) = self.yaw.filter(|v| v.is_finite()) {
            photo.yaw = yaw;
        }
        if let Some(pitch) = self.pitch.filter(|v| v.is_finite()) {
            photo.pitch = pitch;
        }
        if let Some(hidden) = self.hidden {
            photo.hidden = hidden;
        }
        if let Some((width, height)) = self.dimensions {
            photo.width = width;
            photo.height = height;
        }

        match self.kind {
            Some(KindChoice::Fixed(kind)) => photo.set_kind(kind),
            Some(KindChoice::Auto) => photo.set_kind_auto(),
            None if self.dimensions.is_some() => photo.rederive_kind(),
            None => {}
        }
        Ok(())
    }
}

/// Trims tags and drops empty ones.
pub fn normalize_tags<'a>(tags: impl IntoIterator<Item = &'a str>) -> BTreeSet<String> {
    tags.into_iter()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}
