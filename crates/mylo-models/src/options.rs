//! Processing options sent to the processing service.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ModelError;

/// Transition applied between kept segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TransitionStyle {
    #[default]
    Fade,
    Wipe,
    Slide,
    None,
}

impl TransitionStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransitionStyle::Fade => "fade",
            TransitionStyle::Wipe => "wipe",
            TransitionStyle::Slide => "slide",
            TransitionStyle::None => "none",
        }
    }
}

impl fmt::Display for TransitionStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TransitionStyle {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fade" => Ok(TransitionStyle::Fade),
            "wipe" => Ok(TransitionStyle::Wipe),
            "slide" => Ok(TransitionStyle::Slide),
            "none" => Ok(TransitionStyle::None),
            _ => Err(ModelError::UnknownOption(format!("transition style '{}'", s))),
        }
    }
}

/// Burned-in caption preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CaptionStyle {
    #[default]
    Default,
    Mrbeast,
    Hormozi,
    Aliabdaal,
}

impl CaptionStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaptionStyle::Default => "default",
            CaptionStyle::Mrbeast => "mrbeast",
            CaptionStyle::Hormozi => "hormozi",
            CaptionStyle::Aliabdaal => "aliabdaal",
        }
    }
}

impl fmt::Display for CaptionStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for CaptionStyle {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "default" => Ok(CaptionStyle::Default),
            "mrbeast" => Ok(CaptionStyle::Mrbeast),
            "hormozi" => Ok(CaptionStyle::Hormozi),
            "aliabdaal" => Ok(CaptionStyle::Aliabdaal),
            _ => Err(ModelError::UnknownOption(format!("caption style '{}'", s))),
        }
    }
}

/// Options for one processing call.
///
/// Fields left as `None` are omitted from the request so the service
/// applies its own defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingOptions {
    pub remove_silences: bool,
    pub remove_filler_words: bool,
    pub transition_style: TransitionStyle,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_zoom: Option<bool>,
    /// Zoom factor, clamped to 1.2..=2.0
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zoom_intensity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_censor: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption_style: Option<CaptionStyle>,
}

impl Default for ProcessingOptions {
    fn default() -> Self {
        Self {
            remove_silences: true,
            remove_filler_words: true,
            transition_style: TransitionStyle::Fade,
            auto_zoom: None,
            zoom_intensity: None,
            auto_censor: None,
            caption_style: None,
        }
    }
}

impl ProcessingOptions {
    pub fn with_caption_style(mut self, style: CaptionStyle) -> Self {
        self.caption_style = Some(style);
        self
    }

    pub fn with_zoom(mut self, intensity: f64) -> Self {
        self.auto_zoom = Some(true);
        self.zoom_intensity = Some(intensity.clamp(1.2, 2.0));
        self
    }

    pub fn with_auto_censor(mut self, enabled: bool) -> Self {
        self.auto_censor = Some(enabled);
        self
    }
}
