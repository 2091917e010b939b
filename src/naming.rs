use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use regex::Regex;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

const VIDEO_EXT: &str = "mp4";

fn unsafe_chars_regex() -> Result<&'static Regex> {
    static UNSAFE_RE: OnceCell<Regex> = OnceCell::new();
    UNSAFE_RE.get_or_try_init(|| {
        Regex::new(r"[^A-Za-z0-9_-]+").context("failed to compile filename regex")
    })
}

/// Keeps an identifier usable as part of a filename.
pub fn sanitize_component(input: &str) -> Result<String> {
    let cleaned = unsafe_chars_regex()?.replace_all(input.trim(), "-");
    let cleaned = cleaned.trim_matches('-');
    if cleaned.is_empty() {
        Ok("video".to_string())
    } else {
        Ok(cleaned.to_string())
    }
}

fn prompt_file_stem(prompt_file: &Path) -> Result<String> {
    let stem = prompt_file
        .file_stem()
        .and_then(OsStr::to_str)
        .unwrap_or("prompts");
    sanitize_component(stem)
}

fn join_indices(indices: &[usize]) -> String {
    indices
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join("_")
}

/// Base name (without extension) of the video(s) produced by one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputName {
    stem: String,
}

impl OutputName {
    /// `{prompt_file_stem}_{i_j_k}`
    pub fn for_creation(prompt_file: &Path, indices: &[usize]) -> Result<Self> {
        Ok(Self {
            stem: format!("{}_{}", prompt_file_stem(prompt_file)?, join_indices(indices)),
        })
    }

    /// `extended_{video_id}` or `extended_{video_id}_{prompt_file_stem}_{i_j_k}`
    pub fn for_extension(video_id: &str, prompt: Option<(&Path, &[usize])>) -> Result<Self> {
        let mut stem = format!("extended_{}", sanitize_component(video_id)?);
        if let Some((prompt_file, indices)) = prompt {
            stem.push('_');
            stem.push_str(&prompt_file_stem(prompt_file)?);
            stem.push('_');
            stem.push_str(&join_indices(indices));
        }
        Ok(Self { stem })
    }

    pub fn stem(&self) -> &str {
        &self.stem
    }

    /// File name for the `position`-th (0-based) of `total` videos. A lone
    /// video keeps the plain name; several get a 1-based suffix.
    pub fn file_name(&self, position: usize, total: usize) -> String {
        if total > 1 {
            format!("{}_{}.{}", self.stem, position + 1, VIDEO_EXT)
        } else {
            format!("{}.{}", self.stem, VIDEO_EXT)
        }
    }

    pub fn destination(&self, dir: &Path, position: usize, total: usize) -> PathBuf {
        dir.join(self.file_name(position, total))
    }
}
