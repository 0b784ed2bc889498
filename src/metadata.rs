use chrono::{DateTime, SecondsFormat, Utc};
use std::sync::Arc;
use tracing::{debug, info};

use crate::acquire::Platform;
use crate::error::Result;
use crate::model::Clip;
use crate::store::Store;

/// Human-facing fields derived for one clip.
#[derive(Debug, Clone, PartialEq)]
pub struct ClipMetadata {
    pub title: String,
    pub description: String,
    pub hashtags: Vec<String>,
}

/// `mm:ss`, minutes not wrapped at the hour.
pub fn format_timestamp(seconds: f64) -> String {
    let total = seconds.max(0.0).round() as u64;
    format!("{:02}:{:02}", total / 60, total % 60)
}

fn platform_tags(platform: Option<Platform>) -> &'static [&'static str] {
    match platform {
        Some(Platform::YouTube) => &["#Shorts", "#YouTube"],
        Some(Platform::Twitch) => &["#Twitch", "#stream", "#Gaming"],
        Some(Platform::Kick) => &["#Kick", "#stream"],
        None => &["#Shorts"],
    }
}

pub fn build_metadata(
    clip: &Clip,
    source_url: &str,
    platform: Option<Platform>,
    generated_at: DateTime<Utc>,
) -> ClipMetadata {
    let ordinal = clip.index + 1;
    let start = format_timestamp(clip.start_sec);
    let end = format_timestamp(clip.start_sec + clip.duration_sec);
    let length = format_timestamp(clip.duration_sec);

    let title = match platform {
        Some(p) => format!("Clip {} · {} · {}–{}", ordinal, p.label(), start, end),
        None => format!("Clip {} · {}–{}", ordinal, start, end),
    };

    let description = format!(
        "Starts at {}, runs {}\nSource: {}\nGenerated {}",
        start,
        length,
        source_url,
        generated_at.to_rfc3339_opts(SecondsFormat::Secs, true)
    );

    let mut hashtags: Vec<String> = Vec::new();
    let derived = [
        format!("#Start_{}s", clip.start_sec.max(0.0).round() as u64),
        format!("#Duration_{}s", clip.duration_sec.max(0.0).round() as u64),
        format!("#Clip{}", ordinal),
    ];
    for tag in platform_tags(platform)
        .iter()
        .map(|t| t.to_string())
        .chain(derived)
    {
        if !hashtags.contains(&tag) {
            hashtags.push(tag);
        }
    }

    ClipMetadata {
        title,
        description,
        hashtags,
    }
}

pub struct MetadataEnricher {
    store: Arc<dyn Store>,
}

impl MetadataEnricher {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Fill title, description and hashtags in place and persist each clip.
    pub async fn enrich(&self, clips: &mut [Clip], source_url: &str) -> Result<()> {
        if clips.is_empty() {
            return Ok(());
        }

        let platform = Platform::detect(source_url);
        let generated_at = Utc::now();
        for clip in clips.iter_mut() {
            let meta = build_metadata(clip, source_url, platform, generated_at);
            debug!("{} -> {}", clip.id, meta.title);
            clip.title = meta.title;
            clip.description = meta.description;
            clip.hashtags = meta.hashtags;
            self.store.update_clip(clip).await?;
        }

        info!("Enriched {} clip(s)", clips.len());
        Ok(())
    }
}
