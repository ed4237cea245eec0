use chrono::{DateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

use crate::reddit::{self, PostMedia, RedditVideo};

const REDDIT_ORIGIN: &str = "https://www.reddit.com";

/// A normalized feed entry. Immutable once classified.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaItem {
    pub id: String,
    pub title: String,
    pub author: String,
    pub community: String,
    pub score: i64,
    pub comment_count: i64,
    pub payload: MediaPayload,
    pub permalink: String,
    pub created_at: Option<DateTime<Utc>>,
    pub nsfw: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MediaPayload {
    StaticImage {
        url: String,
    },
    AnimatedImage {
        url: String,
    },
    Video {
        source_url: String,
    },
    Gallery {
        images: Vec<GalleryImage>,
    },
    Embed {
        iframe_src: String,
        aspect_ratio: Option<f64>,
        autoplay: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GalleryImage {
    pub url: String,
}

impl MediaPayload {
    /// Whether the item holds something that plays while it is active.
    pub fn is_playable(&self) -> bool {
        match self {
            MediaPayload::Video { .. } | MediaPayload::AnimatedImage { .. } => true,
            MediaPayload::Embed { autoplay, .. } => *autoplay,
            MediaPayload::StaticImage { .. } | MediaPayload::Gallery { .. } => false,
        }
    }

    pub fn kind_label(&self) -> &'static str {
        match self {
            MediaPayload::StaticImage { .. } => "image",
            MediaPayload::AnimatedImage { .. } => "gif",
            MediaPayload::Video { .. } => "video",
            MediaPayload::Gallery { .. } => "gallery",
            MediaPayload::Embed { .. } => "embed",
        }
    }

    /// URL handed to an external player or viewer. Galleries use their first image.
    pub fn primary_url(&self) -> Option<&str> {
        match self {
            MediaPayload::StaticImage { url } | MediaPayload::AnimatedImage { url } => Some(url),
            MediaPayload::Video { source_url } => Some(source_url),
            MediaPayload::Gallery { images } => images.first().map(|image| image.url.as_str()),
            MediaPayload::Embed { iframe_src, .. } => Some(iframe_src),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    MissingIdentifier,
    NoMedia,
}

/// A record that could not be turned into a [`MediaItem`]. Only that record is dropped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("classification skipped for record {id:?}: {reason:?}")]
pub struct ClassificationSkipped {
    pub id: String,
    pub reason: SkipReason,
}

/// Classifies a raw listing record.
///
/// Precedence is fixed: gallery, native video, animated file extension,
/// embeddable external URL, then the image fallback. The function is total;
/// records with nothing displayable come back as [`ClassificationSkipped`].
pub fn classify(post: &reddit::Post) -> Result<MediaItem, ClassificationSkipped> {
    let id = post.id.trim();
    if id.is_empty() {
        return Err(ClassificationSkipped {
            id: String::new(),
            reason: SkipReason::MissingIdentifier,
        });
    }

    let payload = gallery_payload(post)
        .or_else(|| native_video_payload(post))
        .or_else(|| animated_payload(&post.url))
        .or_else(|| embed_payload(post))
        .or_else(|| image_fallback(post))
        .ok_or_else(|| ClassificationSkipped {
            id: id.to_string(),
            reason: SkipReason::NoMedia,
        })?;

    Ok(MediaItem {
        id: id.to_string(),
        title: post.title.trim().to_string(),
        author: post.author.clone(),
        community: post.subreddit.clone(),
        score: post.score,
        comment_count: post.num_comments,
        payload,
        permalink: absolute_permalink(post),
        created_at: created_at(post.created_utc),
        nsfw: post.over_18,
    })
}

fn gallery_payload(post: &reddit::Post) -> Option<MediaPayload> {
    let gallery = post.gallery_data.as_ref()?;
    let metadata = post.media_metadata.as_ref()?;
    let images: Vec<GalleryImage> = gallery
        .items
        .iter()
        .filter_map(|item| metadata.get(&item.media_id))
        .filter(|meta| !meta.status.eq_ignore_ascii_case("failed"))
        .filter_map(|meta| {
            let full = meta.full.as_ref()?;
            full.url
                .as_deref()
                .or(full.gif.as_deref())
                .map(sanitize_url)
                .filter(|url| !url.is_empty())
        })
        .map(|url| GalleryImage { url })
        .collect();
    if images.is_empty() {
        None
    } else {
        Some(MediaPayload::Gallery { images })
    }
}

fn native_video_payload(post: &reddit::Post) -> Option<MediaPayload> {
    video_from_media(post.secure_media.as_ref())
        .or_else(|| video_from_media(post.media.as_ref()))
        .or_else(|| {
            post.crosspost_parent_list.iter().find_map(|parent| {
                video_from_media(parent.secure_media.as_ref())
                    .or_else(|| video_from_media(parent.media.as_ref()))
            })
        })
        .map(|source_url| MediaPayload::Video { source_url })
}

fn video_from_media(media: Option<&PostMedia>) -> Option<String> {
    playback_url(media?.reddit_video.as_ref()?)
}

fn playback_url(video: &RedditVideo) -> Option<String> {
    if video.transcoding_status.eq_ignore_ascii_case("error") {
        return None;
    }
    [&video.fallback_url, &video.hls_url, &video.dash_url]
        .into_iter()
        .map(|candidate| sanitize_url(candidate))
        .find(|candidate| !candidate.is_empty())
}

fn animated_payload(raw_url: &str) -> Option<MediaPayload> {
    let url = sanitize_url(raw_url);
    let parsed = Url::parse(&url).ok()?;
    let path = parsed.path().to_ascii_lowercase();
    if path.ends_with(".gifv") {
        let mut mp4 = parsed.clone();
        let stem = &parsed.path()[..parsed.path().len() - ".gifv".len()];
        mp4.set_path(&format!("{stem}.mp4"));
        return Some(MediaPayload::Video {
            source_url: mp4.to_string(),
        });
    }
    if path.ends_with(".gif") {
        return Some(MediaPayload::AnimatedImage { url });
    }
    None
}

struct EmbedRule {
    pattern: Regex,
    template: &'static str,
    autoplay: bool,
}

static EMBED_RULES: Lazy<Vec<EmbedRule>> = Lazy::new(|| {
    let rule = |pattern: &str, template: &'static str, autoplay: bool| EmbedRule {
        pattern: Regex::new(pattern).expect("embed pattern"),
        template,
        autoplay,
    };
    vec![
        rule(
            r"(?:youtube\.com/(?:watch\?(?:[^#]*&)?v=|shorts/|embed/)|youtu\.be/)([A-Za-z0-9_-]{11})",
            "https://www.youtube.com/embed/{id}",
            false,
        ),
        rule(
            r"vimeo\.com/(?:video/)?(\d+)",
            "https://player.vimeo.com/video/{id}",
            false,
        ),
        rule(
            r"streamable\.com/(?:e/)?([A-Za-z0-9]+)",
            "https://streamable.com/e/{id}",
            true,
        ),
        rule(
            r"redgifs\.com/(?:watch|ifr)/([A-Za-z]+)",
            "https://www.redgifs.com/ifr/{id}",
            true,
        ),
        rule(
            r"gfycat\.com/(?:ifr/)?([A-Za-z]+)",
            "https://gfycat.com/ifr/{id}",
            true,
        ),
    ]
});

fn embed_payload(post: &reddit::Post) -> Option<MediaPayload> {
    let url = sanitize_url(&post.url);
    if url.is_empty() {
        return None;
    }
    let rule = EMBED_RULES
        .iter()
        .find(|rule| rule.pattern.is_match(&url))?;
    let id = rule.pattern.captures(&url)?.get(1)?.as_str();
    let oembed = post
        .secure_media
        .as_ref()
        .and_then(|media| media.oembed.as_ref())
        .or_else(|| post.media.as_ref().and_then(|media| media.oembed.as_ref()));
    let aspect_ratio = oembed.and_then(|oembed| match (oembed.width, oembed.height) {
        (Some(w), Some(h)) if w > 0.0 && h > 0.0 => Some(w / h),
        _ => None,
    });
    Some(MediaPayload::Embed {
        iframe_src: rule.template.replace("{id}", id),
        aspect_ratio,
        autoplay: rule.autoplay,
    })
}

fn image_fallback(post: &reddit::Post) -> Option<MediaPayload> {
    let preview = post
        .preview
        .images
        .first()
        .map(|image| sanitize_url(&image.source.url))
        .filter(|url| !url.is_empty());
    if let Some(url) = preview {
        return Some(MediaPayload::StaticImage { url });
    }
    if post.is_self {
        return None;
    }
    let url = sanitize_url(&post.url);
    let external = url.starts_with("http://") || url.starts_with("https://");
    if !external || is_reddit_permalink(&url) {
        return None;
    }
    Some(MediaPayload::StaticImage { url })
}

fn is_reddit_permalink(url: &str) -> bool {
    Url::parse(url)
        .map(|parsed| {
            let host = parsed.host_str().unwrap_or_default();
            host.ends_with("reddit.com") && parsed.path().contains("/comments/")
        })
        .unwrap_or(false)
}

fn absolute_permalink(post: &reddit::Post) -> String {
    let permalink = post.permalink.trim();
    if permalink.starts_with('/') {
        format!("{REDDIT_ORIGIN}{permalink}")
    } else if permalink.is_empty() {
        sanitize_url(&post.url)
    } else {
        permalink.to_string()
    }
}

fn created_at(created_utc: f64) -> Option<DateTime<Utc>> {
    if created_utc <= 0.0 || !created_utc.is_finite() {
        return None;
    }
    Utc.timestamp_opt(created_utc.trunc() as i64, 0).single()
}

fn sanitize_url(raw: &str) -> String {
    raw.trim().replace("&amp;", "&")
}

/// Compact engagement counter: `999`, `1.2K`, `3.4M`.
pub fn format_count(value: i64) -> String {
    let abs = value.unsigned_abs() as f64;
    let sign = if value < 0 { "-" } else { "" };
    if abs >= 1_000_000.0 {
        format!("{sign}{:.1}M", abs / 1_000_000.0)
    } else if abs >= 1_000.0 {
        format!("{sign}{:.1}K", abs / 1_000.0)
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reddit::{
        GalleryData, GalleryItem, MediaMetadata, MediaMetadataImage, Oembed, Post, Preview,
        PreviewImage, PreviewSource,
    };
    use std::collections::HashMap;

    fn post(id: &str, url: &str) -> Post {
        Post {
            id: id.into(),
            title: format!("post {id}"),
            subreddit: "pics".into(),
            author: "someone".into(),
            url: url.into(),
            permalink: format!("/r/pics/comments/{id}/post/"),
            score: 1520,
            num_comments: 12,
            created_utc: 1_700_000_000.0,
            ..Default::default()
        }
    }

    fn reddit_video(url: &str) -> PostMedia {
        PostMedia {
            reddit_video: Some(RedditVideo {
                fallback_url: url.into(),
                ..Default::default()
            }),
            oembed: None,
        }
    }

    fn with_gallery(mut post: Post, ids: &[&str]) -> Post {
        let mut metadata = HashMap::new();
        for id in ids {
            metadata.insert(
                id.to_string(),
                MediaMetadata {
                    status: "valid".into(),
                    kind: "Image".into(),
                    full: Some(MediaMetadataImage {
                        url: Some(format!("https://preview.redd.it/{id}.jpg?w=1&amp;s=x")),
                        ..Default::default()
                    }),
                    ..Default::default()
                },
            );
        }
        post.is_gallery = true;
        post.gallery_data = Some(GalleryData {
            items: ids
                .iter()
                .enumerate()
                .map(|(idx, id)| GalleryItem {
                    id: idx as i64,
                    media_id: id.to_string(),
                })
                .collect(),
        });
        post.media_metadata = Some(metadata);
        post
    }

    #[test]
    fn gallery_wins_over_native_video() {
        let mut raw = with_gallery(post("g1", "https://www.reddit.com/gallery/g1"), &["a", "b"]);
        raw.is_video = true;
        raw.media = Some(reddit_video("https://v.redd.it/xyz/DASH_720.mp4"));

        let item = classify(&raw).unwrap();
        match item.payload {
            MediaPayload::Gallery { images } => {
                assert_eq!(images.len(), 2);
                assert_eq!(images[0].url, "https://preview.redd.it/a.jpg?w=1&s=x");
                assert_eq!(images[1].url, "https://preview.redd.it/b.jpg?w=1&s=x");
            }
            other => panic!("expected gallery, got {other:?}"),
        }
    }

    #[test]
    fn gallery_without_resolvable_images_falls_through() {
        let mut raw = with_gallery(post("g2", "https://v.redd.it/abc"), &["a"]);
        raw.media_metadata = Some(HashMap::new());
        raw.secure_media = Some(reddit_video("https://v.redd.it/abc/DASH_480.mp4"));
        let item = classify(&raw).unwrap();
        assert!(matches!(item.payload, MediaPayload::Video { .. }));
    }

    #[test]
    fn native_video_uses_fallback_then_hls() {
        let mut raw = post("v1", "https://v.redd.it/abc");
        raw.is_video = true;
        raw.secure_media = Some(PostMedia {
            reddit_video: Some(RedditVideo {
                hls_url: "https://v.redd.it/abc/HLSPlaylist.m3u8?a=1&amp;b=2".into(),
                ..Default::default()
            }),
            oembed: None,
        });
        let item = classify(&raw).unwrap();
        assert_eq!(
            item.payload,
            MediaPayload::Video {
                source_url: "https://v.redd.it/abc/HLSPlaylist.m3u8?a=1&b=2".into()
            }
        );
    }

    #[test]
    fn crosspost_video_is_found() {
        let mut raw = post("x1", "/r/videos/comments/abc/original/");
        raw.crosspost_parent_list = vec![reddit::CrosspostParent {
            media: Some(reddit_video("https://v.redd.it/parent/DASH_360.mp4")),
            secure_media: None,
        }];
        let item = classify(&raw).unwrap();
        assert!(matches!(item.payload, MediaPayload::Video { .. }));
    }

    #[test]
    fn gifv_becomes_video() {
        let item = classify(&post("i1", "https://i.imgur.com/abcdef.gifv")).unwrap();
        assert_eq!(
            item.payload,
            MediaPayload::Video {
                source_url: "https://i.imgur.com/abcdef.mp4".into()
            }
        );
        assert!(item.payload.is_playable());
    }

    #[test]
    fn gif_becomes_animated_image() {
        let item = classify(&post("i2", "https://i.redd.it/loop.GIF")).unwrap();
        assert!(matches!(item.payload, MediaPayload::AnimatedImage { .. }));
        assert!(item.payload.is_playable());
    }

    #[test]
    fn youtube_link_becomes_embed_with_aspect_ratio() {
        let mut raw = post("y1", "https://www.youtube.com/watch?v=dQw4w9WgXcQ&t=3");
        raw.secure_media = Some(PostMedia {
            reddit_video: None,
            oembed: Some(Oembed {
                provider_name: "YouTube".into(),
                width: Some(356.0),
                height: Some(200.0),
            }),
        });
        let item = classify(&raw).unwrap();
        match item.payload {
            MediaPayload::Embed {
                iframe_src,
                aspect_ratio,
                autoplay,
            } => {
                assert_eq!(iframe_src, "https://www.youtube.com/embed/dQw4w9WgXcQ");
                assert!((aspect_ratio.unwrap() - 1.78).abs() < 0.01);
                assert!(!autoplay);
            }
            other => panic!("expected embed, got {other:?}"),
        }
    }

    #[test]
    fn streamable_embed_autoplays() {
        let item = classify(&post("s1", "https://streamable.com/q1w2e3")).unwrap();
        assert_eq!(
            item.payload,
            MediaPayload::Embed {
                iframe_src: "https://streamable.com/e/q1w2e3".into(),
                aspect_ratio: None,
                autoplay: true,
            }
        );
    }

    #[test]
    fn unmatched_url_falls_back_to_static_image() {
        let item = classify(&post("p1", "https://example.com/some/photo")).unwrap();
        assert_eq!(
            item.payload,
            MediaPayload::StaticImage {
                url: "https://example.com/some/photo".into()
            }
        );
        assert!(!item.payload.is_playable());
    }

    #[test]
    fn preview_image_is_preferred_for_fallback() {
        let mut raw = post("p2", "https://example.com/article");
        raw.preview = Preview {
            images: vec![PreviewImage {
                source: PreviewSource {
                    url: "https://preview.redd.it/p2.jpg?auto=webp&amp;s=1".into(),
                    width: 1080,
                    height: 1920,
                },
                ..Default::default()
            }],
            ..Default::default()
        };
        let item = classify(&raw).unwrap();
        assert_eq!(
            item.payload,
            MediaPayload::StaticImage {
                url: "https://preview.redd.it/p2.jpg?auto=webp&s=1".into()
            }
        );
    }

    #[test]
    fn text_posts_are_skipped() {
        let mut raw = post("t1", "https://www.reddit.com/r/pics/comments/t1/text/");
        raw.is_self = true;
        let err = classify(&raw).unwrap_err();
        assert_eq!(err.reason, SkipReason::NoMedia);

        let err = classify(&post("  ", "https://i.redd.it/a.jpg")).unwrap_err();
        assert_eq!(err.reason, SkipReason::MissingIdentifier);
    }

    #[test]
    fn item_fields_are_normalized() {
        let item = classify(&post("n1", "https://i.redd.it/n1.png")).unwrap();
        assert_eq!(item.permalink, "https://www.reddit.com/r/pics/comments/n1/post/");
        assert_eq!(item.community, "pics");
        assert_eq!(item.created_at.unwrap().timestamp(), 1_700_000_000);
    }

    #[test]
    fn format_count_compacts() {
        assert_eq!(format_count(999), "999");
        assert_eq!(format_count(1_520), "1.5K");
        assert_eq!(format_count(2_300_000), "2.3M");
        assert_eq!(format_count(-4), "-4");
    }
}
