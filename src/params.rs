//! Request parameters for creation and extension tasks.
//!
//! Every option comes from a fixed set accepted by the service; parsing a
//! value outside that set, or a prompt over the length limit, is a
//! [`ValidationError`] raised before anything is sent.

use serde::Serialize;
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;

/// Longest prompt the service accepts, in characters.
pub const MAX_PROMPT_CHARS: usize = 2500;

macro_rules! allowed_values {
    ($(#[$meta:meta])* $name:ident, $field:literal, default = $default:ident, { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
        pub enum $name {
            $(
                #[serde(rename = $text)]
                $variant,
            )+
        }

        impl $name {
            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ValidationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim() {
                    $($text => Ok($name::$variant),)+
                    other => Err(ValidationError::NotAllowed {
                        field: $field,
                        value: other.to_string(),
                        allowed: [$($text),+].join(", "),
                    }),
                }
            }
        }

        impl Default for $name {
            fn default() -> Self {
                $name::$default
            }
        }
    };
}

allowed_values!(
    /// Generation model.
    Model, "model", default = KlingV2Master, {
        KlingV1 => "kling-v1",
        KlingV1_6 => "kling-v1-6",
        KlingV2Master => "kling-v2-master",
        KlingV2_1 => "kling-v2-1",
        KlingV2_1Master => "kling-v2-1-master",
    }
);

allowed_values!(
    AspectRatio, "aspect ratio", default = Portrait, {
        Landscape => "16:9",
        Portrait => "9:16",
        Square => "1:1",
    }
);

allowed_values!(
    /// Quality mode: `std` is faster, `pro` renders at higher quality.
    Mode, "mode", default = Standard, {
        Standard => "std",
        Professional => "pro",
    }
);

allowed_values!(
    /// Clip length in seconds.
    VideoDuration, "duration", default = Ten, {
        Five => "5",
        Ten => "10",
    }
);

/// Rejects prompts longer than [`MAX_PROMPT_CHARS`].
pub fn check_prompt_length(prompt: &str) -> Result<(), ValidationError> {
    let len = prompt.chars().count();
    if len > MAX_PROMPT_CHARS {
        return Err(ValidationError::PromptTooLong {
            len,
            max: MAX_PROMPT_CHARS,
        });
    }
    Ok(())
}

/// Body of a text-to-video request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenerationParams {
    pub prompt: String,
    #[serde(rename = "model_name")]
    pub model: Model,
    pub aspect_ratio: AspectRatio,
    pub mode: Mode,
    pub duration: VideoDuration,
}

impl GenerationParams {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            model: Model::default(),
            aspect_ratio: AspectRatio::default(),
            mode: Mode::default(),
            duration: VideoDuration::default(),
        }
    }

    /// Builds parameters from raw strings, as they arrive from a prompt file or config.
    pub fn parse(
        prompt: impl Into<String>,
        model: &str,
        aspect_ratio: &str,
        mode: &str,
        duration: &str,
    ) -> Result<Self, ValidationError> {
        let params = Self {
            prompt: prompt.into(),
            model: model.parse()?,
            aspect_ratio: aspect_ratio.parse()?,
            mode: mode.parse()?,
            duration: duration.parse()?,
        };
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.prompt.trim().is_empty() {
            return Err(ValidationError::EmptyPrompt);
        }
        check_prompt_length(&self.prompt)
    }
}

/// Body of a video-extend request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtensionParams {
    pub video_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
}

impl ExtensionParams {
    pub fn new(video_id: impl Into<String>, prompt: Option<String>) -> Self {
        Self {
            video_id: video_id.into(),
            prompt: prompt.filter(|p| !p.trim().is_empty()),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.video_id.trim().is_empty() {
            return Err(ValidationError::EmptyVideoId);
        }
        match &self.prompt {
            Some(prompt) => check_prompt_length(prompt),
            None => Ok(()),
        }
    }
}
