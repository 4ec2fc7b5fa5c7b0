use std::collections::HashSet;

use sage_protocol::{FILE_MARKER, IMAGE_MARKER};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
  Image,
  File,
}

impl ArtifactKind {
  pub fn marker(self) -> &'static str {
    match self {
      ArtifactKind::Image => IMAGE_MARKER,
      ArtifactKind::File => FILE_MARKER,
    }
  }
}

/// An artifact announced on stdout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkedArtifact {
  pub kind: ArtifactKind,
  /// Path relative to the environment's working directory.
  pub source: String,
  /// File name used in the host output directory.
  pub local_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedOutput {
  pub text: String,
  pub artifacts: Vec<MarkedArtifact>,
}

/// Splits captured stdout into user-visible text and marker lines. Marker
/// lines are deduplicated by source; the first occurrence wins.
pub fn parse_markers(stdout: &str) -> ParsedOutput {
  let mut seen = HashSet::new();
  let mut artifacts = Vec::new();
  let mut lines = Vec::new();

  for line in stdout.lines() {
    let trimmed = line.trim();
    let marked = [ArtifactKind::Image, ArtifactKind::File]
      .into_iter()
      .find_map(|kind| {
        trimmed
          .strip_prefix(kind.marker())
          .map(|source| (kind, source.trim()))
      });

    match marked {
      Some((kind, source)) => {
        if source.is_empty() || !seen.insert(source.to_string()) {
          continue;
        }
        artifacts.push(MarkedArtifact {
          kind,
          source: source.to_string(),
          local_name: local_name(kind, source),
        });
      }
      None => lines.push(line),
    }
  }

  ParsedOutput {
    text: lines.join("\n").trim().to_string(),
    artifacts,
  }
}

fn local_name(kind: ArtifactKind, source: &str) -> String {
  match kind {
    ArtifactKind::Image => source
      .rsplit(['/', '\\'])
      .next()
      .unwrap_or(source)
      .to_string(),
    ArtifactKind::File => source.replace(['/', '\\'], "_"),
  }
}

#[cfg(test)]
mod tests {
  use pretty_assertions::assert_eq;

  use super::*;

  #[test]
  fn marker_lines_are_removed_and_deduplicated() {
    let stdout = "rows: 3\n\
[IMAGE_GENERATED]:plot_1.png\n\
  [FILE_GENERATED]:reports/out.csv  \n\
done\n\
[FILE_GENERATED]:reports/out.csv\n";
    let parsed = parse_markers(stdout);

    assert_eq!(parsed.text, "rows: 3\ndone");
    assert_eq!(
      parsed.artifacts,
      vec![
        MarkedArtifact {
          kind: ArtifactKind::Image,
          source: "plot_1.png".to_string(),
          local_name: "plot_1.png".to_string(),
        },
        MarkedArtifact {
          kind: ArtifactKind::File,
          source: "reports/out.csv".to_string(),
          local_name: "reports_out.csv".to_string(),
        },
      ]
    );
  }

  #[test]
  fn empty_marker_is_dropped() {
    let parsed = parse_markers("[FILE_GENERATED]:\nok");
    assert!(parsed.artifacts.is_empty());
    assert_eq!(parsed.text, "ok");
  }
}
