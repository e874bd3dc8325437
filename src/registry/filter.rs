use crate::model::Photo;
use bon::Builder;
use chrono::{NaiveDate, NaiveTime, TimeDelta};

/// Panorama criterion of a [`PhotoFilter`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PanoramaChoice {
    #[default]
    Any,
    Only,
    Exclude,
}

/// Search criteria for the photo list. An empty filter matches everything.
#[derive(Debug, Clone, Default, Builder)]
pub struct PhotoFilter {
    /// Case-insensitive substring of title, description, author or tags.
    #[builder(into)]
    pub query: Option<String>,
    #[builder(default)]
    pub panorama: PanoramaChoice,
    /// First capture day, in UTC.
    pub from: Option<NaiveDate>,
    /// Last capture day, in UTC. The whole day is included.
    pub until: Option<NaiveDate>,
}

impl PhotoFilter {
    pub fn matches(&self, photo: &Photo) -> bool {
        self.matches_query(photo) && self.matches_panorama(photo) && self.matches_dates(photo)
    }

    fn matches_query(&self, photo: &Photo) -> bool {
        let Some(query) = self.query.as_deref().map(str::trim).filter(|q| !q.is_empty()) else {
            return true;
        };
        let tags: Vec<&str> = photo.tags.iter().map(String::as_str).collect();
        let haystack = format!(
            "{} {} {} {}",
            photo.title,
            photo.description,
            photo.author,
            tags.join(",")
        );
        haystack.to_lowercase().contains(&query.to_lowercase())
    }

    fn matches_panorama(&self, photo: &Photo) -> bool {
        match self.panorama {
            PanoramaChoice::Any => true,
            PanoramaChoice::Only => photo.is_panorama(),
            PanoramaChoice::Exclude => !photo.is_panorama(),
        }
    }

    fn matches_dates(&self, photo: &Photo) -> bool {
        if self.from.is_none() && self.until.is_none() {
            return true;
        }
        let Some(captured) = photo.captured_at else {
            return false;
        };
        if let Some(from) = self.from
            && captured < from.and_time(NaiveTime::MIN).and_utc()
        {
            return false;
        }
        if let Some(until) = self.until {
            let end = until.and_time(NaiveTime::MIN).and_utc() + TimeDelta::days(1)
                - TimeDelta::milliseconds(1);
            if captured > end {
                return false;
            }
        }
        true
    }
}
