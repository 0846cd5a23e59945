use tagrelay_provider::Release;

/// Concatenate the notes of `releases` in the order given.
///
/// Each non-empty block is followed by a newline; with `include_tag_header`
/// it is also preceded by a `## <tag>` line and followed by a blank line.
/// Releases without notes contribute nothing, header included.
pub fn merge(releases: &[Release], include_tag_header: bool) -> String {
    releases
        .iter()
        .filter(|release| !release.notes.is_empty())
        .fold(String::new(), |mut merged, release| {
            if include_tag_header {
                merged.push_str("## ");
                merged.push_str(&release.tag);
                merged.push('\n');
            }
            merged.push_str(&release.notes);
            merged.push('\n');
            if include_tag_header {
                merged.push('\n');
            }
            merged
        })
}
