//! Transformation profiles and the built-in catalog.

use serde::{Deserialize, Serialize};

use super::error::TaskError;

/// Placeholder replaced by the local input path.
pub const INPUT_PLACEHOLDER: &str = "{input}";

/// Placeholder replaced by the task's local output path.
pub const OUTPUT_PLACEHOLDER: &str = "{output}";

/// One artifact the pipeline derives from its input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformProfile {
    /// Task name, used in logs and reports.
    pub name: String,
    /// Output file extension, without the dot.
    pub extension: String,
    /// Content type declared on upload.
    pub content_type: String,
    /// Executable to run.
    pub program: String,
    /// Arguments, with `{input}` / `{output}` placeholders.
    #[serde(default)]
    pub args: Vec<String>,
    /// Destination container; the pipeline's output container when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_container: Option<String>,
}

impl TransformProfile {
    pub fn new(
        name: impl Into<String>,
        extension: impl Into<String>,
        content_type: impl Into<String>,
        program: impl Into<String>,
        args: Vec<String>,
    ) -> Self {
        Self {
            name: name.into(),
            extension: extension.into(),
            content_type: content_type.into(),
            program: program.into(),
            args,
            destination_container: None,
        }
    }

    /// Parses a whitespace-separated command template.
    ///
    /// The first token is the executable, the rest are positional
    /// arguments. No shell quoting is interpreted, so an argument cannot
    /// contain whitespace; build the profile with [`TransformProfile::new`]
    /// when one must.
    pub fn from_template(
        name: impl Into<String>,
        extension: impl Into<String>,
        content_type: impl Into<String>,
        template: &str,
    ) -> Result<Self, TaskError> {
        let name = name.into();
        let mut tokens = template.split_whitespace();
        let program = tokens
            .next()
            .ok_or_else(|| TaskError::EmptyCommand { name: name.clone() })?;
        let args = tokens.map(str::to_string).collect();

        Ok(Self::new(name, extension, content_type, program, args))
    }

    /// Routes this profile's artifact to a specific container.
    pub fn with_destination(mut self, container: impl Into<String>) -> Self {
        self.destination_container = Some(container.into());
        self
    }

    /// Replaces the executable.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }
}

fn ffmpeg_profile(name: &str, content_type: &str, args: &str) -> TransformProfile {
    TransformProfile::new(
        name,
        name,
        content_type,
        "ffmpeg",
        args.split_whitespace().map(str::to_string).collect(),
    )
}

/// The built-in catalog: a WebM and an MP4 rendition plus a JPEG thumbnail.
pub fn default_catalog() -> Vec<TransformProfile> {
    vec![
        ffmpeg_profile(
            "webm",
            "video/webm",
            "-i {input} -vcodec libvpx -acodec libvorbis -pix_fmt yuv420p \
             -quality good -b:v 2M -crf 5 -movflags faststart \
             -vf scale=trunc(in_w/2)*2:trunc(in_h/2)*2 \
             -f webm -y {output}",
        ),
        ffmpeg_profile(
            "mp4",
            "video/mp4",
            "-i {input} -vcodec libx264 -pix_fmt yuv420p -profile:v baseline \
             -preset slower -movflags faststart -strict -2 -crf 18 \
             -vf scale=trunc(in_w/2)*2:trunc(in_h/2)*2 \
             -y {output}",
        ),
        ffmpeg_profile(
            "jpg",
            "image/jpg",
            "-i {input} -ss 00:00:03.435 -vcodec mjpeg -q:v 10 -vf scale=200:-1 \
             -vframes 1 -an -f image2 -y {output}",
        ),
    ]
}
