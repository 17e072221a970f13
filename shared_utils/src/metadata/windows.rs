//! Windows creation time

use std::fs::{FileTimes, OpenOptions};
use std::io;
use std::os::windows::fs::FileTimesExt;
use std::path::Path;

pub fn copy_creation_time(src: &Path, dst: &Path) -> io::Result<()> {
    let created = std::fs::metadata(src)?.created()?;
    let file = OpenOptions::new().write(true).open(dst)?;
    file.set_times(FileTimes::new().set_created(created))
}
