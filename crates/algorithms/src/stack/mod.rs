//! Band stacking: concatenating the bands of several rasters into one
//!
//! Bands keep source-raster then source-band order. Two implementations:
//! [`NativeBandStacker`] copies rows through the raster I/O layer,
//! [`ProcessBandStacker`] delegates to an external merge program such as
//! `gdal_merge.py`.

use dtclassifier_core::io::{create_raster, open_raster, RasterSource, RasterWindow};
use dtclassifier_core::{Error, PixelType, Result};
use ndarray::Axis;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Lines of the merge program's stderr kept in the error
const STDERR_TAIL_LINES: usize = 5;

/// Merges rasters on a common grid into one multi-band raster
pub trait BandStacker {
    /// Write the stack of `inputs` to `output` and return the composite path.
    ///
    /// Any failure is reported as [`Error::MergeFailed`].
    fn stack_bands(&self, inputs: &[PathBuf], output: &Path) -> Result<PathBuf>;

    fn name(&self) -> &'static str;
}

/// In-process stacker writing a Float64 GeoTIFF, one row at a time
#[derive(Debug, Clone, Default)]
pub struct NativeBandStacker;

impl NativeBandStacker {
    fn merge(&self, inputs: &[PathBuf], output: &Path) -> Result<usize> {
        let sources = inputs
            .iter()
            .map(|path| open_raster(path))
            .collect::<Result<Vec<Box<dyn RasterSource>>>>()?;
        let Some(first) = sources.first() else {
            return Err(Error::MergeFailed("no input rasters".into()));
        };
        for source in &sources[1..] {
            first.grid_info().ensure_same_grid(source.grid_info())?;
        }

        let band_count: usize = sources.iter().map(|s| s.grid_info().band_count).sum();
        let info = first.grid_info().with_bands(band_count);
        let fill = info.nodata.unwrap_or(f64::NAN);
        let (rows, cols) = info.shape();
        let mut sink = create_raster(output, &info, PixelType::Float64)?;

        let mut offset = 0;
        for source in &sources {
            let source_info = source.grid_info();
            let bands = source_info.band_count;
            for row in 0..rows {
                let window = RasterWindow::row(row, cols);
                let mut block = source.read_window(0..bands, window)?;
                // each input's own nodata becomes the composite's
                block.mapv_inplace(|v| if source_info.is_missing(v) { fill } else { v });
                for (b, values) in block.axis_iter(Axis(0)).enumerate() {
                    sink.write_window(offset + b, window, values)?;
                }
            }
            offset += bands;
        }
        sink.flush()?;
        Ok(band_count)
    }
}

impl BandStacker for NativeBandStacker {
    fn stack_bands(&self, inputs: &[PathBuf], output: &Path) -> Result<PathBuf> {
        if inputs.is_empty() {
            return Err(Error::MergeFailed("no input rasters".into()));
        }
        let bands = self.merge(inputs, output).map_err(|e| match e {
            Error::MergeFailed(_) => e,
            other => Error::MergeFailed(other.to_string()),
        })?;

        info!(
            inputs = inputs.len(),
            bands,
            output = %output.display(),
            "stacked bands"
        );
        Ok(output.to_path_buf())
    }

    fn name(&self) -> &'static str {
        "native"
    }
}

/// Stacker running an external merge program.
///
/// The program is invoked as `<program> -separate -of GTiff -o <output>
/// <inputs...>`, the `gdal_merge.py` convention.
#[derive(Debug, Clone)]
pub struct ProcessBandStacker {
    program: PathBuf,
    timeout: Duration,
    poll_interval: Duration,
}

impl ProcessBandStacker {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            timeout: Duration::from_secs(600),
            poll_interval: Duration::from_millis(50),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    fn command(&self, inputs: &[PathBuf], output: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(["-separate", "-of", "GTiff", "-o"])
            .arg(output)
            .args(inputs)
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        cmd
    }
}

impl BandStacker for ProcessBandStacker {
    fn stack_bands(&self, inputs: &[PathBuf], output: &Path) -> Result<PathBuf> {
        if inputs.is_empty() {
            return Err(Error::MergeFailed("no input rasters".into()));
        }
        let program = self.program.display().to_string();
        debug!(program = %program, inputs = inputs.len(), output = %output.display(), "running merge program");

        let mut child = self
            .command(inputs, output)
            .spawn()
            .map_err(|e| Error::MergeFailed(format!("cannot run {}: {}", program, e)))?;
        // drained on its own thread so a chatty program cannot block on a full pipe
        let stderr = child.stderr.take().map(|mut pipe| {
            thread::spawn(move || {
                let mut text = String::new();
                let _ = pipe.read_to_string(&mut text);
                text
            })
        });
        let stderr_tail = move || {
            let text = stderr.and_then(|h| h.join().ok()).unwrap_or_default();
            let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
            let tail = lines[lines.len().saturating_sub(STDERR_TAIL_LINES)..].join("; ");
            if tail.is_empty() {
                String::new()
            } else {
                format!(": {}", tail)
            }
        };

        let start = Instant::now();
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if start.elapsed() >= self.timeout => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(Error::MergeFailed(format!(
                        "{} timed out after {:?}",
                        program, self.timeout
                    )));
                }
                Ok(None) => thread::sleep(self.poll_interval),
                Err(e) => return Err(Error::MergeFailed(format!("waiting for {}: {}", program, e))),
            }
        };

        if !status.success() {
            return Err(Error::MergeFailed(format!(
                "{} exited with {}{}",
                program,
                status,
                stderr_tail()
            )));
        }
        if !output.exists() {
            return Err(Error::MergeFailed(format!(
                "{} did not produce {}",
                program,
                output.display()
            )));
        }
        info!(program = %program, inputs = inputs.len(), output = %output.display(), "stacked bands");
        Ok(output.to_path_buf())
    }

    fn name(&self) -> &'static str {
        "process"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dtclassifier_core::io::{read_stack, write_raster};
    use dtclassifier_core::{GeoTransform, MultiBandRaster, Raster};
    use ndarray::Array2;
    use tempfile::TempDir;

    fn write_single(dir: &Path, name: &str, value: f64) -> PathBuf {
        let mut raster = Raster::from_array(Array2::from_elem((3, 2), value));
        raster.set_transform(GeoTransform::new(0.0, 3.0, 1.0, -1.0));
        let path = dir.join(name);
        write_raster(&raster, &path).unwrap();
        path
    }

    #[test]
    fn test_native_stacks_in_order() {
        let dir = TempDir::new().unwrap();
        let a = write_single(dir.path(), "a.tif", 1.5);
        let b = write_single(dir.path(), "b.tif", 7.25);
        let out = dir.path().join("stack.tif");

        let path = NativeBandStacker.stack_bands(&[a, b], &out).unwrap();
        let stack = read_stack(&path).unwrap();
        assert_eq!(stack.band_count(), 2);
        assert_eq!(stack.pixel(2, 1).unwrap(), vec![1.5, 7.25]);
    }

    #[test]
    fn test_native_maps_each_input_nodata() {
        let dir = TempDir::new().unwrap();
        let a = write_single(dir.path(), "a.tif", 2.0);
        let mut b = Raster::from_array(Array2::from_elem((3, 2), 4.0));
        b.set_transform(GeoTransform::new(0.0, 3.0, 1.0, -1.0));
        b.set_nodata(Some(-1.0));
        b.set(0, 0, -1.0).unwrap();
        let b_path = dir.path().join("b.tif");
        write_raster(&b, &b_path).unwrap();

        let path = NativeBandStacker
            .stack_bands(&[a, b_path], &dir.path().join("stack.tif"))
            .unwrap();
        let stack: MultiBandRaster = read_stack(&path).unwrap();
        let pixel = stack.pixel(0, 0).unwrap();
        assert_eq!(pixel[0], 2.0);
        assert!(pixel[1].is_nan());
        assert_eq!(stack.pixel(1, 1).unwrap(), vec![2.0, 4.0]);
    }

    #[test]
    fn test_native_grid_mismatch_is_merge_failure() {
        let dir = TempDir::new().unwrap();
        let a = write_single(dir.path(), "a.tif", 1.0);
        let mut wide = Raster::from_array(Array2::from_elem((3, 5), 1.0));
        wide.set_transform(GeoTransform::new(0.0, 3.0, 1.0, -1.0));
        let b = dir.path().join("wide.tif");
        write_raster(&wide, &b).unwrap();

        let err = NativeBandStacker.stack_bands(&[a, b], &dir.path().join("out.tif")).unwrap_err();
        assert!(matches!(err, Error::MergeFailed(_)));
    }

    #[test]
    fn test_native_missing_input_is_merge_failure() {
        let dir = TempDir::new().unwrap();
        let err = NativeBandStacker
            .stack_bands(&[dir.path().join("missing.tif")], &dir.path().join("out.tif"))
            .unwrap_err();
        assert!(matches!(err, Error::MergeFailed(_)));
    }

    #[test]
    fn test_empty_inputs() {
        let out = Path::new("out.tif");
        assert!(matches!(NativeBandStacker.stack_bands(&[], out), Err(Error::MergeFailed(_))));
        assert!(matches!(
            ProcessBandStacker::new("gdal_merge.py").stack_bands(&[], out),
            Err(Error::MergeFailed(_))
        ));
    }

    #[test]
    fn test_process_spawn_failure() {
        let dir = TempDir::new().unwrap();
        let stacker = ProcessBandStacker::new(dir.path().join("no-such-merge-program"));
        let err = stacker
            .stack_bands(&[dir.path().join("a.tif")], &dir.path().join("out.tif"))
            .unwrap_err();
        assert!(matches!(err, Error::MergeFailed(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_process_nonzero_exit() {
        let dir = TempDir::new().unwrap();
        let stacker = ProcessBandStacker::new("false").with_timeout(Duration::from_secs(10));
        let err = stacker
            .stack_bands(&[dir.path().join("a.tif")], &dir.path().join("out.tif"))
            .unwrap_err();
        assert!(matches!(err, Error::MergeFailed(msg) if msg.contains("exited")));
    }

    #[cfg(unix)]
    #[test]
    fn test_process_failure_carries_stderr() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let script = dir.path().join("merge.sh");
        std::fs::write(&script, "#!/bin/sh\necho 'starting' >&2\necho 'ERROR 4: a.tif: No such file' >&2\nexit 3\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let stacker = ProcessBandStacker::new(&script).with_timeout(Duration::from_secs(10));
        let err = stacker
            .stack_bands(&[dir.path().join("a.tif")], &dir.path().join("out.tif"))
            .unwrap_err();
        let Error::MergeFailed(msg) = err else {
            panic!("expected a merge failure");
        };
        assert!(msg.contains("exited"), "{}", msg);
        assert!(msg.ends_with("starting; ERROR 4: a.tif: No such file"), "{}", msg);
    }

    #[cfg(unix)]
    #[test]
    fn test_process_success_without_output() {
        let dir = TempDir::new().unwrap();
        let stacker = ProcessBandStacker::new("true");
        let err = stacker
            .stack_bands(&[dir.path().join("a.tif")], &dir.path().join("out.tif"))
            .unwrap_err();
        assert!(matches!(err, Error::MergeFailed(msg) if msg.contains("did not produce")));
    }
}
