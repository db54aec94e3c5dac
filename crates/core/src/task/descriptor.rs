//! Task descriptors built from the catalog for one input.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::transfer::InputArtifact;

use super::error::TaskError;
use super::profile::{TransformProfile, INPUT_PLACEHOLDER, OUTPUT_PLACEHOLDER};

/// An executable plus its ordered arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            if arg.contains(char::is_whitespace) {
                write!(f, " {:?}", arg)?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}

/// One fully resolved transformation task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDescriptor {
    /// Profile name.
    pub name: String,
    /// Command to execute.
    pub command: CommandSpec,
    /// Local input the command reads.
    pub input_local_path: PathBuf,
    /// Local file the command is expected to produce.
    pub output_local_path: PathBuf,
    /// Container the artifact is uploaded to.
    pub destination_container: String,
    /// Key the artifact is uploaded under.
    pub destination_key: String,
    /// Content type declared on upload.
    pub content_type: String,
}

/// File stem used for derived artifacts: everything before the first `.`.
///
/// `movie.mov` and `movie.final.mov` both yield `movie`. A name without a
/// usable stem (`.mov`) is kept whole.
pub fn artifact_stem(file_name: &str) -> &str {
    match file_name.split('.').next() {
        Some(stem) if !stem.is_empty() => stem,
        _ => file_name,
    }
}

/// Builds one descriptor per profile, in catalog order.
///
/// Outputs land next to the input as `<stem>.<extension>`.
pub fn build_descriptors(
    input: &InputArtifact,
    catalog: &[TransformProfile],
    default_container: &str,
) -> Result<Vec<TaskDescriptor>, TaskError> {
    if catalog.is_empty() {
        return Err(TaskError::EmptyCatalog);
    }

    let file_name = input
        .local_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| TaskError::InputMissing {
            path: input.local_path.clone(),
        })?;
    let stem = artifact_stem(&file_name);
    let work_dir = input.work_dir();

    let mut seen = HashSet::new();
    let mut descriptors = Vec::with_capacity(catalog.len());

    for profile in catalog {
        let descriptor = build_descriptor(input, work_dir, stem, profile, default_container)?;

        if descriptor.output_local_path == input.local_path {
            return Err(TaskError::OutputOverwritesInput {
                name: descriptor.name,
                path: descriptor.output_local_path,
            });
        }
        if !seen.insert(descriptor.output_local_path.clone()) {
            return Err(TaskError::DuplicateOutput {
                name: descriptor.name,
                path: descriptor.output_local_path,
            });
        }

        descriptors.push(descriptor);
    }

    Ok(descriptors)
}

fn build_descriptor(
    input: &InputArtifact,
    work_dir: &Path,
    stem: &str,
    profile: &TransformProfile,
    default_container: &str,
) -> Result<TaskDescriptor, TaskError> {
    if profile.program.trim().is_empty() {
        return Err(TaskError::EmptyCommand {
            name: profile.name.clone(),
        });
    }

    let output_name = format!("{}.{}", stem, profile.extension.trim_start_matches('.'));
    let output_local_path = work_dir.join(&output_name);

    let input_str = input.local_path.to_string_lossy();
    let output_str = output_local_path.to_string_lossy();
    let args = profile
        .args
        .iter()
        .map(|arg| {
            arg.replace(INPUT_PLACEHOLDER, &input_str)
                .replace(OUTPUT_PLACEHOLDER, &output_str)
        })
        .collect();

    Ok(TaskDescriptor {
        name: profile.name.clone(),
        command: CommandSpec::new(profile.program.clone(), args),
        input_local_path: input.local_path.clone(),
        output_local_path,
        destination_container: profile
            .destination_container
            .clone()
            .unwrap_or_else(|| default_container.to_string()),
        destination_key: output_name,
        content_type: profile.content_type.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::RemoteHeaders;
    use crate::task::default_catalog;

    fn input(path: &str) -> InputArtifact {
        InputArtifact {
            container: "video_input".to_string(),
            key: "movie.mov".to_string(),
            local_path: PathBuf::from(path),
            size_bytes: 1024,
            headers: RemoteHeaders::new(),
        }
    }

    #[test]
    fn test_default_catalog_descriptors() {
        let input = input("/go/video/tmp-movie.mov/movie.mov");
        let descriptors = build_descriptors(&input, &default_catalog(), "video_output").unwrap();

        let summary: Vec<(&str, &str, &str)> = descriptors
            .iter()
            .map(|d| {
                (
                    d.destination_key.as_str(),
                    d.destination_container.as_str(),
                    d.content_type.as_str(),
                )
            })
            .collect();
        assert_eq!(
            summary,
            vec![
                ("movie.webm", "video_output", "video/webm"),
                ("movie.mp4", "video_output", "video/mp4"),
                ("movie.jpg", "video_output", "image/jpg"),
            ]
        );

        let webm = &descriptors[0];
        assert_eq!(
            webm.output_local_path,
            PathBuf::from("/go/video/tmp-movie.mov/movie.webm")
        );
        assert_eq!(webm.command.program, "ffmpeg");
        assert_eq!(webm.command.args[1], "/go/video/tmp-movie.mov/movie.mov");
        assert_eq!(
            webm.command.args.last().unwrap(),
            "/go/video/tmp-movie.mov/movie.webm"
        );
    }

    #[test]
    fn test_output_paths_are_unique() {
        let input = input("/work/tmp-movie.mov/movie.mov");
        let descriptors = build_descriptors(&input, &default_catalog(), "out").unwrap();

        let unique: HashSet<_> = descriptors.iter().map(|d| &d.output_local_path).collect();
        assert_eq!(unique.len(), descriptors.len());
        assert!(descriptors.iter().all(|d| !d.command.program.is_empty()));
    }

    #[test]
    fn test_stem_stops_at_first_dot() {
        assert_eq!(artifact_stem("movie.final.mov"), "movie");
        assert_eq!(artifact_stem("movie"), "movie");
        assert_eq!(artifact_stem(".mov"), ".mov");
    }

    #[test]
    fn test_placeholders_inside_arguments() {
        let profile = TransformProfile::new(
            "log",
            "txt",
            "text/plain",
            "ffprobe",
            vec!["--in={input}".to_string(), "--out={output}".to_string()],
        );
        let input = input("/w/clip.mov");
        let descriptors = build_descriptors(&input, &[profile], "out").unwrap();

        assert_eq!(
            descriptors[0].command.args,
            vec!["--in=/w/clip.mov", "--out=/w/clip.txt"]
        );
    }

    #[test]
    fn test_arguments_with_spaces_are_preserved() {
        let profile = TransformProfile::new(
            "mp4",
            "mp4",
            "video/mp4",
            "ffmpeg",
            vec![
                "-i".to_string(),
                "{input}".to_string(),
                "-metadata".to_string(),
                "title=My Movie".to_string(),
                "{output}".to_string(),
            ],
        );
        let input = input("/w/dir with spaces/movie.mov");
        let descriptors = build_descriptors(&input, &[profile], "out").unwrap();

        let args = &descriptors[0].command.args;
        assert_eq!(args.len(), 5);
        assert_eq!(args[1], "/w/dir with spaces/movie.mov");
        assert_eq!(args[3], "title=My Movie");
    }

    #[test]
    fn test_destination_override() {
        let catalog = vec![
            default_catalog().remove(2).with_destination("thumbnails"),
            default_catalog().remove(0),
        ];
        let input = input("/w/movie.mov");
        let descriptors = build_descriptors(&input, &catalog, "video_output").unwrap();

        assert_eq!(descriptors[0].destination_container, "thumbnails");
        assert_eq!(descriptors[1].destination_container, "video_output");
    }

    #[test]
    fn test_duplicate_extension_rejected() {
        let mut catalog = default_catalog();
        catalog.push(default_catalog().remove(0));
        let input = input("/w/movie.mov");

        let result = build_descriptors(&input, &catalog, "out");
        assert!(matches!(result, Err(TaskError::DuplicateOutput { .. })));
    }

    #[test]
    fn test_output_overwriting_input_rejected() {
        let input = input("/w/movie.mp4");
        let result = build_descriptors(&input, &default_catalog(), "out");
        assert!(matches!(
            result,
            Err(TaskError::OutputOverwritesInput { ref name, .. }) if name == "mp4"
        ));
    }

    #[test]
    fn test_empty_catalog_rejected() {
        let input = input("/w/movie.mov");
        assert!(matches!(
            build_descriptors(&input, &[], "out"),
            Err(TaskError::EmptyCatalog)
        ));
    }

    #[test]
    fn test_blank_program_rejected() {
        let profile = TransformProfile::new("x", "x", "application/octet-stream", " ", vec![]);
        let input = input("/w/movie.mov");
        assert!(matches!(
            build_descriptors(&input, &[profile], "out"),
            Err(TaskError::EmptyCommand { .. })
        ));
    }

    #[test]
    fn test_command_display() {
        let command = CommandSpec::new(
            "ffmpeg",
            vec!["-i".into(), "a b.mov".into(), "out.mp4".into()],
        );
        assert_eq!(command.to_string(), "ffmpeg -i \"a b.mov\" out.mp4");
    }
}
