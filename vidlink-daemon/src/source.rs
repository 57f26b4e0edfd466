//! The raw YUV420 file source.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

/// Reads fixed-size raw YUV420 frames (Y, then U, then V planes), wrapping
/// back to the first frame when the file runs out.
pub struct YuvFileSource {
    file: File,
    frame_size: usize,
}

impl YuvFileSource {
    pub fn open(path: &Path, width: u16, height: u16) -> io::Result<Self> {
        let frame_size = width as usize * height as usize * 3 / 2;
        Ok(Self {
            file: File::open(path)?,
            frame_size,
        })
    }

    /// Bytes per frame: `width * height * 3 / 2`.
    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Fill `buf` with the next frame, looping to the start of the file at
    /// EOF. Fails only if the file holds less than one whole frame.
    pub fn read_frame(&mut self, buf: &mut [u8]) -> io::Result<()> {
        debug_assert_eq!(buf.len(), self.frame_size);

        if !self.try_fill(buf)? {
            self.file.seek(SeekFrom::Start(0))?;
            if !self.try_fill(buf)? {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "input file holds less than one frame",
                ));
            }
        }
        Ok(())
    }

    /// Read a whole frame; false at EOF (a trailing partial frame counts as
    /// EOF, like the original stream it was cut from).
    fn try_fill(&mut self, buf: &mut [u8]) -> io::Result<bool> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.file.read(&mut buf[filled..])?;
            if n == 0 {
                return Ok(false);
            }
            filled += n;
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    // 4x4 YUV420: 24 bytes per frame
    const WIDTH: u16 = 4;
    const HEIGHT: u16 = 4;
    const FRAME_SIZE: usize = 24;

    fn write_source(frames: &[u8]) -> (tempfile::NamedTempFile, YuvFileSource) {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(frames).unwrap();
        file.flush().unwrap();
        let source = YuvFileSource::open(file.path(), WIDTH, HEIGHT).unwrap();
        (file, source)
    }

    #[test]
    fn frame_size_follows_the_yuv420_layout() {
        let (_file, source) = write_source(&[0u8; FRAME_SIZE]);
        assert_eq!(source.frame_size(), FRAME_SIZE);

        let file = tempfile::NamedTempFile::new().unwrap();
        let hd = YuvFileSource::open(file.path(), 1280, 720).unwrap();
        assert_eq!(hd.frame_size(), 1_382_400);
    }

    #[test]
    fn frames_are_read_in_order() {
        let mut data = Vec::new();
        data.extend(std::iter::repeat(1u8).take(FRAME_SIZE));
        data.extend(std::iter::repeat(2u8).take(FRAME_SIZE));
        let (_file, mut source) = write_source(&data);

        let mut buf = vec![0u8; FRAME_SIZE];
        source.read_frame(&mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == 1));
        source.read_frame(&mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == 2));
    }

    #[test]
    fn eof_wraps_to_the_first_frame() {
        let mut data = Vec::new();
        data.extend(std::iter::repeat(1u8).take(FRAME_SIZE));
        data.extend(std::iter::repeat(2u8).take(FRAME_SIZE));
        // trailing partial frame is skipped by the wrap
        data.extend(std::iter::repeat(3u8).take(FRAME_SIZE / 2));
        let (_file, mut source) = write_source(&data);

        let mut buf = vec![0u8; FRAME_SIZE];
        for _ in 0..2 {
            source.read_frame(&mut buf).unwrap();
        }
        source.read_frame(&mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == 1), "expected wrap to frame 1");
    }

    #[test]
    fn too_small_input_is_an_error() {
        let (_file, mut source) = write_source(&[0u8; FRAME_SIZE / 2]);
        let mut buf = vec![0u8; FRAME_SIZE];
        assert_eq!(
            source.read_frame(&mut buf).unwrap_err().kind(),
            io::ErrorKind::UnexpectedEof
        );
    }
}
