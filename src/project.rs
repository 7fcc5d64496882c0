//! Input data model for an export: a source video plus timed subtitles.
//!
//! Field names follow the JSON shape the frontend submits (`Id`, `Video`,
//! `Subtitles`, ...). A `Project` is immutable once submitted.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Project {
    #[serde(default)]
    pub id: String,
    /// URL of the source video to download.
    pub video: String,
    /// When set, the probe for an audio stream is skipped and the
    /// output carries no audio.
    #[serde(default)]
    pub silent: bool,
    #[serde(default)]
    pub subtitles: Vec<Subtitle>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Subtitle {
    /// Text to render. May contain line breaks.
    pub text: String,
    /// Start time in seconds.
    #[serde(default)]
    pub time: f64,
    /// Duration in seconds.
    #[serde(default)]
    pub duration: f64,
    /// Hex color like `#ffcc00`. Falls back to white if it does not parse.
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub position: Position,
}

/// Anchors for subtitle placement. Unknown or empty values mean center.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Position {
    /// Horizontal anchor: `left`, `right` or anything else for center.
    #[serde(default)]
    pub x: String,
    /// Vertical anchor: `top`, `bottom` or anything else for center.
    #[serde(default)]
    pub y: String,
}

impl Subtitle {
    /// True if the subtitle is visible at sample time `t`.
    /// The active window `[time, time + duration]` is inclusive on both ends.
    pub fn active_at(&self, t: f64) -> bool {
        self.time <= t && t <= self.time + self.duration
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn active_window_is_inclusive() {
        let subtitle = Subtitle {
            text: "Hi".to_string(),
            time: 0.0,
            duration: 2.0,
            color: String::new(),
            position: Position::default(),
        };

        assert!(subtitle.active_at(0.0));
        assert!(subtitle.active_at(1.0));
        assert!(subtitle.active_at(2.0));
        assert!(!subtitle.active_at(2.0001));
        assert!(!subtitle.active_at(-0.0001));
    }

    #[test]
    fn deserializes_submission_body() {
        let body = r##"{
            "Id": "1234",
            "Video": "https://example.com/video.mp4",
            "Silent": false,
            "Subtitles": [
                {
                    "Text": "Hi",
                    "Time": 0,
                    "Duration": 1,
                    "Color": "#ffffff",
                    "Position": {"X": "center", "Y": "bottom"}
                }
            ]
        }"##;

        let project: Project = serde_json::from_str(body).unwrap();
        assert_eq!(project.id, "1234");
        assert_eq!(project.video, "https://example.com/video.mp4");
        assert!(!project.silent);
        assert_eq!(project.subtitles.len(), 1);
        assert_eq!(project.subtitles[0].text, "Hi");
        assert_eq!(project.subtitles[0].position.y, "bottom");
    }

    #[test]
    fn missing_optional_fields_default() {
        let body = r#"{"Video": "https://example.com/v.mp4"}"#;
        let project: Project = serde_json::from_str(body).unwrap();
        assert!(project.subtitles.is_empty());
        assert!(!project.silent);

        let sub: Subtitle = serde_json::from_str(r#"{"Text": "x"}"#).unwrap();
        assert_eq!(sub.time, 0.0);
        assert_eq!(sub.color, "");
        assert_eq!(sub.position.x, "");
    }
}
