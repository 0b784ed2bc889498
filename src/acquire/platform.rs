use reqwest::Url;
use std::fmt;

/// Video platforms whose pages need the specialized downloader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    YouTube,
    Twitch,
    Kick,
}

impl Platform {
    /// Classify a source URL by host; `None` for direct media and unknown hosts.
    pub fn detect(url: &str) -> Option<Platform> {
        let parsed = Url::parse(url.trim()).ok()?;
        let host = parsed.host_str()?.to_ascii_lowercase();
        let on = |domain: &str| host == domain || host.ends_with(&format!(".{}", domain));

        if on("youtube.com") || on("youtu.be") || on("youtube-nocookie.com") {
            Some(Platform::YouTube)
        } else if on("twitch.tv") {
            Some(Platform::Twitch)
        } else if on("kick.com") {
            Some(Platform::Kick)
        } else {
            None
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Platform::YouTube => "YouTube",
            Platform::Twitch => "Twitch",
            Platform::Kick => "Kick",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hosts_map_to_platforms() {
        assert_eq!(Platform::detect("https://www.youtube.com/watch?v=abc"), Some(Platform::YouTube));
        assert_eq!(Platform::detect("https://youtu.be/abc"), Some(Platform::YouTube));
        assert_eq!(Platform::detect("https://m.twitch.tv/videos/1"), Some(Platform::Twitch));
        assert_eq!(Platform::detect("https://kick.com/someone"), Some(Platform::Kick));
    }

    #[test]
    fn lookalike_and_direct_urls_are_generic() {
        assert_eq!(Platform::detect("https://notyoutube.com/watch"), None);
        assert_eq!(Platform::detect("https://cdn.example.com/kick.com.mp4"), None);
        assert_eq!(Platform::detect("not a url"), None);
    }
}
