use std::path::{Path, PathBuf};

/// Highest capture index tried before giving up.
pub const MAX_CAPTURE_INDEX: u32 = 9999;

/// Output names reserved for one capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureSlot {
    pub index: u32,
    pub video_path: PathBuf,
    pub still_dir: PathBuf,
}

pub fn capture_stem(index: u32) -> String {
    format!("capture_{index:04}")
}

pub fn still_file_name(index: usize) -> String {
    format!("frame_{index:04}.jpg")
}

/// Lowest index whose video file and still directory are both unused.
pub fn next_capture_slot(root: &Path, video_extension: &str) -> Option<CaptureSlot> {
    (0..=MAX_CAPTURE_INDEX).find_map(|index| {
        let stem = capture_stem(index);
        let video_path = root.join(format!("{stem}.{video_extension}"));
        let still_dir = root.join(&stem);
        let free = !video_path.exists() && !still_dir.exists();
        free.then_some(CaptureSlot {
            index,
            video_path,
            still_dir,
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn skips_indices_taken_by_either_form() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("capture_0000.mp4"), b"").expect("video");
        fs::create_dir(dir.path().join("capture_0001")).expect("stills");

        let slot = next_capture_slot(dir.path(), "mp4").expect("slot");
        assert_eq!(slot.index, 2);
        assert_eq!(slot.video_path, dir.path().join("capture_0002.mp4"));
        assert_eq!(slot.still_dir, dir.path().join("capture_0002"));
    }

    #[test]
    fn fills_gaps_from_the_bottom() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::create_dir(dir.path().join("capture_0001")).expect("stills");
        let slot = next_capture_slot(dir.path(), "mp4").expect("slot");
        assert_eq!(slot.index, 0);
    }

    #[test]
    fn names_are_zero_padded() {
        assert_eq!(capture_stem(7), "capture_0007");
        assert_eq!(still_file_name(42), "frame_0042.jpg");
        assert_eq!(still_file_name(12345), "frame_12345.jpg");
    }
}
