//! Just enough HTML handling for placemark descriptions: find the media references and
//! reduce the fragment to plain text.
use crate::archive::{is_image_name, is_video_name};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref VIDEO_SRC_RE: Regex =
        Regex::new(r#"(?is)<video\b[^>]*?\bsrc\s*=\s*["']([^"']+)["']|<video\b.*?<source\b[^>]*?\bsrc\s*=\s*["']([^"']+)["']"#)
            .unwrap();
    static ref IMG_SRC_RE: Regex =
        Regex::new(r#"(?is)<img\b[^>]*?\bsrc\s*=\s*["']([^"']+)["']"#).unwrap();
    static ref ANCHOR_RE: Regex =
        Regex::new(r#"(?is)<a\b[^>]*?\bhref\s*=\s*["']([^"']+)["']"#).unwrap();
    static ref TAG_RE: Regex = Regex::new(r"(?s)<[^>]*>").unwrap();
    static ref ENTITY_RE: Regex = Regex::new(r"&(#[0-9]+|#[xX][0-9a-fA-F]+|[a-zA-Z]+);").unwrap();
    static ref SPACE_RE: Regex = Regex::new(r"\s+").unwrap();
}

/// A media reference found in a description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaHref {
    Video(String),
    Image(String),
}

impl MediaHref {
    pub fn href(&self) -> &str {
        match self {
            MediaHref::Video(href) | MediaHref::Image(href) => href,
        }
    }
}

/// The first video and the first image reference of a description, each in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaHrefs {
    pub video: Option<String>,
    pub image: Option<String>,
}

impl MediaHrefs {
    pub fn is_empty(&self) -> bool {
        self.video.is_none() && self.image.is_none()
    }

    /// Candidates in the order they should be tried: the video, then the image.
    pub fn in_priority(self) -> impl Iterator<Item = MediaHref> {
        self.video
            .map(MediaHref::Video)
            .into_iter()
            .chain(self.image.map(MediaHref::Image))
    }
}

/// Finds the media references of a description.
///
/// Videos are `<video src>`, a `<source src>` inside a video, or a link to a video file.
/// Images are `<img src>` or a link to an image file.
pub fn find_media_hrefs(html: &str) -> MediaHrefs {
    let anchor_to = |accept: fn(&str) -> bool| {
        ANCHOR_RE.captures_iter(html).find_map(|caps| {
            let href = caps.get(1)?;
            accept(strip_query(&decode_entities(href.as_str())))
                .then(|| (caps.get(0).map_or(0, |m| m.start()), href.as_str()))
        })
    };

    let video_tag = VIDEO_SRC_RE.captures(html).and_then(|caps| {
        let start = caps.get(0)?.start();
        caps.get(1).or_else(|| caps.get(2)).map(|m| (start, m.as_str()))
    });
    let image_tag = IMG_SRC_RE
        .captures(html)
        .and_then(|caps| Some((caps.get(0)?.start(), caps.get(1)?.as_str())));

    MediaHrefs {
        video: earliest(video_tag, anchor_to(is_video_name)),
        image: earliest(image_tag, anchor_to(is_image_name)),
    }
}

fn earliest(a: Option<(usize, &str)>, b: Option<(usize, &str)>) -> Option<String> {
    [a, b]
        .into_iter()
        .flatten()
        .min_by_key(|&(start, _)| start)
        .map(|(_, href)| decode_entities(href))
}

fn strip_query(href: &str) -> &str {
    href.split(['?', '#']).next().unwrap_or(href)
}

/// Text content of an HTML fragment with whitespace collapsed.
pub fn html_to_text(html: &str) -> String {
    let stripped = TAG_RE.replace_all(html, " ");
    let decoded = decode_entities(&stripped);
    SPACE_RE.replace_all(decoded.trim(), " ").into_owned()
}

pub fn decode_entities(text: &str) -> String {
    ENTITY_RE
        .replace_all(text, |caps: &regex::Captures| {
            let entity = &caps[1];
            let decoded = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "nbsp" => Some('\u{a0}'),
                _ => {
                    let code = if let Some(hex) = entity.strip_prefix("#x").or(entity.strip_prefix("#X")) {
                        u32::from_str_radix(hex, 16).ok()
                    } else {
                        entity.strip_prefix('#').and_then(|dec| dec.parse::<u32>().ok())
                    };
                    code.and_then(char::from_u32)
                }
            };
            decoded.map_or_else(|| caps[0].to_string(), String::from)
        })
        .into_owned()
}
