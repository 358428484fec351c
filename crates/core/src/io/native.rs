//! Native GeoTIFF reading/writing (without GDAL dependency)
//!
//! Uses the `tiff` crate. Each band is stored as its own page (IFD); a
//! pixel-interleaved page is read as one band per sample. Georeferencing
//! covers pixel scale + tiepoint, the full model transformation for rotated
//! grids, the CRS in the GeoKey directory (EPSG code and WKT citation) and the
//! GDAL nodata tag.
//!
//! Neither side holds a whole band in memory. [`GeoTiffSource`] decodes only
//! the strips or tiles a window touches and keeps the current chunk row of
//! each page. [`GeoTiffSink`] stages written rows in an anonymous scratch file
//! in the output sample type and encodes the pages strip by strip on flush.

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::io::{check_bands, check_block, RasterSink, RasterSource, RasterWindow};
use crate::raster::RasterElement;
use crate::raster::{GeoTransform, PixelType, RasterGridInfo};
use ndarray::{Array3, ArrayView2};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::ops::Range;
use std::path::{Path, PathBuf};
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::encoder::colortype::{ColorType, Gray32Float, Gray64Float, Gray8, GrayI32};
use tiff::encoder::{DirectoryEncoder, TiffEncoder, TiffKindStandard, TiffValue};
use tiff::tags::Tag;

const GT_MODEL_TYPE: u16 = 1024;
const GT_RASTER_TYPE: u16 = 1025;
const GT_CITATION: u16 = 1026;
const GEOGRAPHIC_TYPE: u16 = 2048;
const PROJECTED_CS_TYPE: u16 = 3072;
const GEO_ASCII_PARAMS: u16 = 34737;

/// Target size of one encoded strip
const STRIP_BYTES: usize = 64 * 1024;

fn tiff_err(context: &str) -> impl Fn(tiff::TiffError) -> Error + '_ {
    move |e| Error::Other(format!("{}: {}", context, e))
}

/// Strip or tile layout of one page
#[derive(Debug, Clone, Copy)]
struct PageLayout {
    samples: usize,
    chunk_width: usize,
    chunk_height: usize,
    chunks_across: usize,
}

/// Where a band lives in the file
#[derive(Debug, Clone, Copy)]
struct BandRef {
    page: usize,
    sample: usize,
}

/// One decoded strip or tile, without padding
struct DecodedChunk {
    width: usize,
    values: Vec<f64>,
}

/// Decoded chunks of the chunk row last touched on a page
#[derive(Default)]
struct ChunkRow {
    row: Option<usize>,
    chunks: HashMap<usize, DecodedChunk>,
}

struct DecoderState {
    decoder: Decoder<BufReader<File>>,
    page: usize,
    cache: Vec<ChunkRow>,
}

impl DecoderState {
    fn chunk(&mut self, page: usize, layout: &PageLayout, info: &RasterGridInfo, cy: usize, cx: usize) -> Result<&DecodedChunk> {
        let cached = &mut self.cache[page];
        if cached.row != Some(cy) {
            cached.row = Some(cy);
            cached.chunks.clear();
        }

        if !cached.chunks.contains_key(&cx) {
            if self.page != page {
                self.decoder
                    .seek_to_image(page)
                    .map_err(tiff_err("Cannot seek to page"))?;
                self.page = page;
            }
            let index = cy * layout.chunks_across + cx;
            let width = layout.chunk_width.min(info.x_size - cx * layout.chunk_width);
            let height = layout.chunk_height.min(info.y_size - cy * layout.chunk_height);
            let values = decoding_to_f64(
                self.decoder
                    .read_chunk(index as u32)
                    .map_err(tiff_err("Cannot read image data"))?,
            )?;
            if values.len() < width * height * layout.samples {
                return Err(Error::InvalidDimensions { width, height });
            }
            cached.chunks.insert(cx, DecodedChunk { width, values });
        }

        cached
            .chunks
            .get(&cx)
            .ok_or_else(|| Error::Other(format!("chunk {} of page {} not decoded", cx, page)))
    }
}

/// A GeoTIFF file opened for windowed reads
pub struct GeoTiffSource {
    path: PathBuf,
    info: RasterGridInfo,
    bands: Vec<BandRef>,
    pages: Vec<PageLayout>,
    state: RefCell<DecoderState>,
}

impl fmt::Debug for GeoTiffSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeoTiffSource")
            .field("path", &self.path)
            .field("info", &self.info)
            .field("pages", &self.pages)
            .finish()
    }
}

impl GeoTiffSource {
    /// Read the directory of every page; pixel data stays on disk
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let mut decoder = Decoder::new(BufReader::new(file))
            .map_err(tiff_err("TIFF decode error"))?
            .with_limits(Limits::unlimited());

        let (width, height) = decoder.dimensions().map_err(tiff_err("Cannot read dimensions"))?;
        let rows = height as usize;
        let cols = width as usize;
        if rows == 0 || cols == 0 {
            return Err(Error::InvalidDimensions { width: cols, height: rows });
        }

        let transform = read_geotransform(&mut decoder).unwrap_or_default();
        let crs = read_crs(&mut decoder);
        let nodata = read_nodata(&mut decoder);

        let mut pages = Vec::new();
        let mut bands = Vec::new();
        loop {
            let dims = decoder.dimensions().map_err(tiff_err("Cannot read dimensions"))?;
            if dims != (width, height) {
                return Err(Error::SizeMismatch {
                    er: rows,
                    ec: cols,
                    ar: dims.1 as usize,
                    ac: dims.0 as usize,
                });
            }

            let layout = page_layout(&mut decoder, cols)?;
            bands.extend((0..layout.samples).map(|sample| BandRef {
                page: pages.len(),
                sample,
            }));
            pages.push(layout);

            if !decoder.more_images() {
                break;
            }
            decoder.next_image().map_err(tiff_err("Cannot read next page"))?;
        }

        let mut info = RasterGridInfo::new(cols, rows, bands.len(), transform);
        info.crs = crs;
        info.nodata = nodata;

        let state = DecoderState {
            decoder,
            page: pages.len() - 1,
            cache: pages.iter().map(|_| ChunkRow::default()).collect(),
        };
        Ok(Self {
            path: path.to_path_buf(),
            info,
            bands,
            pages,
            state: RefCell::new(state),
        })
    }
}

impl RasterSource for GeoTiffSource {
    fn grid_info(&self) -> &RasterGridInfo {
        &self.info
    }

    fn read_window(&self, bands: Range<usize>, window: RasterWindow) -> Result<Array3<f64>> {
        check_bands(&self.info, &bands)?;
        window.check_within(&self.info)?;
        let mut out = Array3::zeros((bands.len(), window.rows, window.cols));
        if window.is_empty() {
            return Ok(out);
        }

        let row_end = window.row_off + window.rows;
        let col_end = window.col_off + window.cols;
        let mut state = self.state.borrow_mut();
        for (i, band) in bands.enumerate() {
            let BandRef { page, sample } = self.bands[band];
            let layout = self.pages[page];

            for cy in window.row_off / layout.chunk_height..=(row_end - 1) / layout.chunk_height {
                for cx in window.col_off / layout.chunk_width..=(col_end - 1) / layout.chunk_width {
                    let chunk = state.chunk(page, &layout, &self.info, cy, cx)?;
                    let y0 = cy * layout.chunk_height;
                    let x0 = cx * layout.chunk_width;
                    let rows = window.row_off.max(y0)..row_end.min(y0 + layout.chunk_height);
                    let cols = window.col_off.max(x0)..col_end.min(x0 + chunk.width);
                    for r in rows {
                        for c in cols.clone() {
                            let at = ((r - y0) * chunk.width + (c - x0)) * layout.samples + sample;
                            out[[i, r - window.row_off, c - window.col_off]] = chunk.values[at];
                        }
                    }
                }
            }
        }
        Ok(out)
    }
}

fn page_layout<R: Read + Seek>(decoder: &mut Decoder<R>, width: usize) -> Result<PageLayout> {
    let samples = decoder
        .find_tag_unsigned::<u16>(Tag::SamplesPerPixel)
        .map_err(tiff_err("Cannot read samples per pixel"))?
        .unwrap_or(1) as usize;
    let planar = decoder
        .find_tag_unsigned::<u16>(Tag::PlanarConfiguration)
        .map_err(tiff_err("Cannot read planar configuration"))?
        .unwrap_or(1);
    if samples > 1 && planar == 2 {
        return Err(Error::UnsupportedDataType(
            "planar multi-sample TIFF pages".to_string(),
        ));
    }

    let (chunk_width, chunk_height) = decoder.chunk_dimensions();
    let chunk_width = (chunk_width as usize).max(1);
    let chunk_height = (chunk_height as usize).max(1);
    Ok(PageLayout {
        samples: samples.max(1),
        chunk_width,
        chunk_height,
        chunks_across: (width + chunk_width - 1) / chunk_width,
    })
}

fn decoding_to_f64(result: DecodingResult) -> Result<Vec<f64>> {
    let values = match result {
        DecodingResult::U8(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::U16(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::U32(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::U64(buf) => buf.into_iter().map(|v| v as f64).collect(),
        DecodingResult::I8(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::I16(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::I32(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::I64(buf) => buf.into_iter().map(|v| v as f64).collect(),
        DecodingResult::F32(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::F64(buf) => buf,
        #[allow(unreachable_patterns)]
        _ => return Err(Error::UnsupportedDataType("Unsupported TIFF pixel format".to_string())),
    };
    Ok(values)
}

fn read_geotransform<R: Read + Seek>(decoder: &mut Decoder<R>) -> Result<GeoTransform> {
    if let Ok(m) = decoder.get_tag_f64_vec(Tag::ModelTransformationTag) {
        if m.len() >= 8 {
            return Ok(GeoTransform::from_gdal([m[3], m[0], m[1], m[7], m[4], m[5]]));
        }
    }

    let scale = decoder
        .get_tag_f64_vec(Tag::ModelPixelScaleTag)
        .map_err(|_| Error::Other("No pixel scale tag".into()))?;
    let tiepoint = decoder
        .get_tag_f64_vec(Tag::ModelTiepointTag)
        .map_err(|_| Error::Other("No tiepoint tag".into()))?;

    if scale.len() >= 2 && tiepoint.len() >= 6 {
        // tiepoint: [I, J, K, X, Y, Z] with I = col, J = row
        let origin_x = tiepoint[3] - tiepoint[0] * scale[0];
        let origin_y = tiepoint[4] + tiepoint[1] * scale[1];
        return Ok(GeoTransform::new(origin_x, origin_y, scale[0], -scale[1]));
    }

    Err(Error::Other("Cannot determine geotransform".into()))
}

fn read_crs<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<CRS> {
    let keys = decoder.get_tag_u16_vec(Tag::GeoKeyDirectoryTag).ok()?;
    // header: version, revision, minor, key count; then 4 shorts per key
    let count = *keys.get(3)? as usize;
    let entries = keys.get(4..4 + count * 4)?;

    let epsg = entries
        .chunks_exact(4)
        .find(|k| (k[0] == PROJECTED_CS_TYPE || k[0] == GEOGRAPHIC_TYPE) && k[1] == 0)
        .map(|k| u32::from(k[3]));
    let wkt = entries
        .chunks_exact(4)
        .find(|k| k[0] == GT_CITATION && k[1] == GEO_ASCII_PARAMS)
        .and_then(|k| {
            let params = decoder.get_tag_ascii_string(Tag::GeoAsciiParamsTag).ok()?;
            let start = k[3] as usize;
            let text = params.get(start..start + k[2] as usize)?;
            let text = text.trim_end_matches(|c| c == '|' || c == char::from(0));
            (!text.is_empty()).then(|| text.to_string())
        });

    match (wkt, epsg) {
        (Some(wkt), Some(code)) => Some(CRS::from_wkt(wkt).with_epsg(code)),
        (Some(wkt), None) => Some(CRS::from_wkt(wkt)),
        (None, Some(code)) => Some(CRS::from_epsg(code)),
        (None, None) => None,
    }
}

fn read_nodata<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<f64> {
    let text = decoder.get_tag_ascii_string(Tag::GdalNodata).ok()?;
    text.trim_matches(char::from(0)).trim().parse::<f64>().ok()
}

/// Streaming GeoTIFF writer.
///
/// Written rows go to a scratch file in the output sample type, one band
/// after the other; [`RasterSink::flush`] encodes them strip by strip.
pub struct GeoTiffSink {
    path: PathBuf,
    info: RasterGridInfo,
    pixel_type: PixelType,
    scratch: File,
}

impl fmt::Debug for GeoTiffSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeoTiffSink")
            .field("path", &self.path)
            .field("info", &self.info)
            .field("pixel_type", &self.pixel_type)
            .finish()
    }
}

impl GeoTiffSink {
    /// Start a new file. Unwritten cells hold the grid's nodata value, or the
    /// pixel type's when the grid has none.
    pub fn create(path: &Path, info: &RasterGridInfo, pixel_type: PixelType) -> Result<Self> {
        if info.band_count == 0 || info.x_size == 0 || info.y_size == 0 {
            return Err(Error::InvalidDimensions {
                width: info.x_size,
                height: info.y_size,
            });
        }
        // fail early on unwritable locations
        File::create(path).map_err(|e| Error::Writer {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let fill = info.nodata.unwrap_or_else(|| pixel_type.nodata());
        let mut row = Vec::with_capacity(info.x_size * pixel_type.byte_size());
        encode_cells(pixel_type, std::iter::repeat(fill).take(info.x_size), &mut row);

        let mut scratch = BufWriter::new(tempfile::tempfile()?);
        for _ in 0..info.band_count * info.y_size {
            scratch.write_all(&row)?;
        }
        let scratch = scratch.into_inner().map_err(|e| Error::Io(e.into_error()))?;

        Ok(Self {
            path: path.to_path_buf(),
            info: info.clone(),
            pixel_type,
            scratch,
        })
    }

    fn offset(&self, band: usize, row: usize, col: usize) -> u64 {
        let cell = (band * self.info.y_size + row) * self.info.x_size + col;
        (cell * self.pixel_type.byte_size()) as u64
    }
}

impl RasterSink for GeoTiffSink {
    fn grid_info(&self) -> RasterGridInfo {
        self.info.clone()
    }

    fn pixel_type(&self) -> PixelType {
        self.pixel_type
    }

    fn write_window(&mut self, band: usize, window: RasterWindow, data: ArrayView2<'_, f64>) -> Result<()> {
        check_bands(&self.info, &(band..band + 1))?;
        window.check_within(&self.info)?;
        check_block(&window, &data)?;

        let mut bytes = Vec::with_capacity(window.cols * self.pixel_type.byte_size());
        for (r, values) in data.outer_iter().enumerate() {
            bytes.clear();
            encode_cells(self.pixel_type, values.iter().copied(), &mut bytes);
            let offset = self.offset(band, window.row_off + r, window.col_off);
            self.scratch.seek(SeekFrom::Start(offset))?;
            self.scratch.write_all(&bytes)?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        let file = File::create(&self.path).map_err(|e| Error::Writer {
            path: self.path.clone(),
            reason: e.to_string(),
        })?;
        let mut encoder = TiffEncoder::new(BufWriter::new(file)).map_err(tiff_err("TIFF encoder error"))?;

        let row_bytes = self.info.x_size * self.pixel_type.byte_size();
        let rows_per_strip = (STRIP_BYTES / row_bytes).clamp(1, self.info.y_size);
        for band in 0..self.info.band_count {
            let pages = PageWriter {
                info: &self.info,
                scratch: &mut self.scratch,
                band,
                rows_per_strip,
            };
            match self.pixel_type {
                PixelType::Byte => pages.write::<_, Gray8>(&mut encoder, |b| b[0])?,
                PixelType::Int32 => pages.write::<_, GrayI32>(&mut encoder, |b| i32::from_ne_bytes(word(b)))?,
                PixelType::Float32 => pages.write::<_, Gray32Float>(&mut encoder, |b| f32::from_ne_bytes(word(b)))?,
                PixelType::Float64 => pages.write::<_, Gray64Float>(&mut encoder, |b| f64::from_ne_bytes(word(b)))?,
            }
        }
        Ok(())
    }
}

/// Append `values` to `out` in the stored representation of `pixel_type`
fn encode_cells(pixel_type: PixelType, values: impl Iterator<Item = f64>, out: &mut Vec<u8>) {
    for v in values {
        match pixel_type {
            PixelType::Byte => out.push(u8::from_f64(v)),
            PixelType::Int32 => out.extend_from_slice(&i32::from_f64(v).to_ne_bytes()),
            PixelType::Float32 => out.extend_from_slice(&(v as f32).to_ne_bytes()),
            PixelType::Float64 => out.extend_from_slice(&v.to_ne_bytes()),
        }
    }
}

fn word<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(bytes);
    out
}

/// Encodes one band of the scratch file as a page
struct PageWriter<'a> {
    info: &'a RasterGridInfo,
    scratch: &'a mut File,
    band: usize,
    rows_per_strip: usize,
}

impl PageWriter<'_> {
    fn write<W, C>(self, encoder: &mut TiffEncoder<W>, decode: fn(&[u8]) -> C::Inner) -> Result<()>
    where
        W: Write + Seek,
        C: ColorType,
        [C::Inner]: TiffValue,
    {
        let (rows, cols) = self.info.shape();
        let size = std::mem::size_of::<C::Inner>();
        let mut image = encoder
            .new_image::<C>(cols as u32, rows as u32)
            .map_err(tiff_err("Cannot create TIFF image"))?;
        image
            .rows_per_strip(self.rows_per_strip as u32)
            .map_err(tiff_err("Cannot set strip size"))?;
        write_geo_tags(image.encoder(), self.info)?;

        let mut bytes = Vec::new();
        let mut row = 0;
        while row < rows {
            let n = self.rows_per_strip.min(rows - row);
            bytes.resize(n * cols * size, 0);
            let offset = ((self.band * rows + row) * cols * size) as u64;
            self.scratch.seek(SeekFrom::Start(offset))?;
            self.scratch.read_exact(&mut bytes)?;
            let strip: Vec<C::Inner> = bytes.chunks_exact(size).map(decode).collect();
            image.write_strip(&strip).map_err(tiff_err("Cannot write image data"))?;
            row += n;
        }
        image.finish().map_err(tiff_err("Cannot finish TIFF image"))
    }
}

fn write_geo_tags<W: Write + Seek>(
    dir: &mut DirectoryEncoder<'_, W, TiffKindStandard>,
    info: &RasterGridInfo,
) -> Result<()> {
    let gt = &info.transform;

    if gt.is_axis_aligned() && gt.pixel_width > 0.0 && gt.pixel_height < 0.0 {
        let scale = [gt.pixel_width, -gt.pixel_height, 0.0];
        dir.write_tag(Tag::ModelPixelScaleTag, &scale[..])
            .map_err(tiff_err("Cannot write scale tag"))?;
        let tiepoint = [0.0, 0.0, 0.0, gt.origin_x, gt.origin_y, 0.0];
        dir.write_tag(Tag::ModelTiepointTag, &tiepoint[..])
            .map_err(tiff_err("Cannot write tiepoint tag"))?;
    } else {
        let matrix = [
            gt.pixel_width, gt.row_rotation, 0.0, gt.origin_x,
            gt.col_rotation, gt.pixel_height, 0.0, gt.origin_y,
            0.0, 0.0, 0.0, 0.0,
            0.0, 0.0, 0.0, 1.0,
        ];
        dir.write_tag(Tag::ModelTransformationTag, &matrix[..])
            .map_err(tiff_err("Cannot write transformation tag"))?;
    }

    let crs = info.crs.as_ref();
    let geographic = crs.map_or(false, |c| c.is_geographic());
    let mut keys: Vec<u16> = vec![
        1, 1, 0, 2,
        GT_MODEL_TYPE, 0, 1, if geographic { 2 } else { 1 },
        GT_RASTER_TYPE, 0, 1, 1,
    ];
    // GeoTIFF ASCII params are '|' terminated
    let citation = crs.and_then(|c| c.wkt()).map(|wkt| format!("{}|", wkt.replace('|', " ")));
    if let Some(text) = citation.as_ref().filter(|t| t.len() <= u16::MAX as usize) {
        keys.extend_from_slice(&[GT_CITATION, GEO_ASCII_PARAMS, text.len() as u16, 0]);
    }
    if let Some(code) = crs.and_then(|c| c.epsg()).and_then(|c| u16::try_from(c).ok()) {
        let key = if geographic { GEOGRAPHIC_TYPE } else { PROJECTED_CS_TYPE };
        keys.extend_from_slice(&[key, 0, 1, code]);
    }
    keys[3] = ((keys.len() - 4) / 4) as u16;
    dir.write_tag(Tag::GeoKeyDirectoryTag, keys.as_slice())
        .map_err(tiff_err("Cannot write geokey tag"))?;
    if let Some(text) = citation.as_ref().filter(|t| t.len() <= u16::MAX as usize) {
        dir.write_tag(Tag::GeoAsciiParamsTag, text.as_str())
            .map_err(tiff_err("Cannot write geo ascii params"))?;
    }

    if let Some(nodata) = info.nodata {
        let text = if nodata.is_nan() { "nan".to_string() } else { nodata.to_string() };
        dir.write_tag(Tag::GdalNodata, text.as_str())
            .map_err(tiff_err("Cannot write nodata tag"))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::Array2;
    use tempfile::TempDir;

    fn grid(bands: usize) -> RasterGridInfo {
        let mut info = RasterGridInfo::new(4, 3, bands, GeoTransform::new(500.0, 1000.0, 10.0, -10.0));
        info.crs = Some(CRS::from_epsg(25830));
        info
    }

    #[test]
    fn test_multiband_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stack.tif");

        let mut sink = GeoTiffSink::create(&path, &grid(2), PixelType::Float64).unwrap();
        let a = Array2::from_shape_fn((3, 4), |(r, c)| (r * 4 + c) as f64);
        let b = a.mapv(|v| v * 0.5);
        sink.write_window(0, RasterWindow::new(0, 0, 3, 4), a.view()).unwrap();
        sink.write_window(1, RasterWindow::new(0, 0, 3, 4), b.view()).unwrap();
        sink.flush().unwrap();

        let source = GeoTiffSource::open(&path).unwrap();
        let info = source.grid_info();
        assert_eq!(info.band_count, 2);
        assert_eq!(info.shape(), (3, 4));
        assert_eq!(info.transform, GeoTransform::new(500.0, 1000.0, 10.0, -10.0));
        assert_eq!(info.crs.as_ref().and_then(|c| c.epsg()), Some(25830));

        let block = source.read_window(0..2, RasterWindow::row(2, 4)).unwrap();
        assert_relative_eq!(block[[0, 0, 3]], 11.0);
        assert_relative_eq!(block[[1, 0, 3]], 5.5);
    }

    #[test]
    fn test_byte_output_keeps_nodata() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("classes.tif");
        let mut info = grid(1);
        info.nodata = Some(255.0);

        let mut sink = GeoTiffSink::create(&path, &info, PixelType::Byte).unwrap();
        let row = Array2::from_elem((1, 4), 1.0);
        sink.write_window(0, RasterWindow::row(0, 4), row.view()).unwrap();
        sink.flush().unwrap();

        let source = GeoTiffSource::open(&path).unwrap();
        assert_eq!(source.grid_info().nodata, Some(255.0));
        let block = source.read_window(0..1, RasterWindow::full(source.grid_info())).unwrap();
        assert_eq!(block[[0, 0, 0]], 1.0);
        assert_eq!(block[[0, 1, 0]], 255.0);
    }

    #[test]
    fn test_georeferencing_survives_every_pixel_type() {
        let dir = TempDir::new().unwrap();
        for (pixel_type, nodata) in [
            (PixelType::Byte, 255.0),
            (PixelType::Int32, -9999.0),
            (PixelType::Float32, -1.0),
            (PixelType::Float64, -1.0),
        ] {
            let path = dir.path().join(format!("{}.tif", pixel_type));
            let mut info = RasterGridInfo::new(10, 10, 1, GeoTransform::new(500.0, 1000.0, 10.0, -10.0));
            info.crs = Some(CRS::from_epsg(25830));
            info.nodata = Some(nodata);
            GeoTiffSink::create(&path, &info, pixel_type).unwrap().flush().unwrap();

            let source = GeoTiffSource::open(&path).unwrap();
            let read = source.grid_info();
            assert_eq!(read.transform, info.transform, "{}", pixel_type);
            assert_eq!(read.crs.as_ref().and_then(|c| c.epsg()), Some(25830), "{}", pixel_type);
            assert_eq!(read.nodata, Some(nodata), "{}", pixel_type);
        }
    }

    #[test]
    fn test_wkt_only_crs_is_kept() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("wkt.tif");
        let wkt = r#"PROJCS["Local grid",GEOGCS["WGS 84"],PROJECTION["Transverse_Mercator"]]"#;
        let mut info = grid(1);
        info.crs = Some(CRS::from_wkt(wkt));
        GeoTiffSink::create(&path, &info, PixelType::Float32).unwrap().flush().unwrap();

        let source = GeoTiffSource::open(&path).unwrap();
        let crs = source.grid_info().crs.clone().unwrap();
        assert_eq!(crs.wkt(), Some(wkt));
        assert_eq!(crs.epsg(), None);
    }

    #[test]
    fn test_multi_strip_windows() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tall.tif");
        // 2000 Float64 columns give 4 rows per strip
        let (rows, cols) = (10, 2000);
        let info = RasterGridInfo::new(cols, rows, 2, GeoTransform::new(0.0, 10.0, 1.0, -1.0));
        let mut sink = GeoTiffSink::create(&path, &info, PixelType::Float64).unwrap();
        for row in (0..rows).rev() {
            let values = Array2::from_shape_fn((1, cols), |(_, c)| (row * cols + c) as f64);
            sink.write_window(0, RasterWindow::row(row, cols), values.view()).unwrap();
            sink.write_window(1, RasterWindow::row(row, cols), values.mapv(|v| -v).view())
                .unwrap();
        }
        sink.flush().unwrap();

        let source = GeoTiffSource::open(&path).unwrap();
        assert_eq!(source.pages[0].chunk_height, 4);
        // crosses the strip boundary between rows 3 and 4
        let block = source.read_window(0..2, RasterWindow::new(3, 1998, 2, 2)).unwrap();
        assert_eq!(block[[0, 0, 0]], (3 * cols + 1998) as f64);
        assert_eq!(block[[0, 1, 1]], (4 * cols + 1999) as f64);
        assert_eq!(block[[1, 1, 0]], -((4 * cols + 1998) as f64));
        // going back to an earlier strip after a later one
        let block = source.read_window(1..2, RasterWindow::row(0, cols)).unwrap();
        assert_eq!(block[[0, 0, 5]], -5.0);
        let block = source.read_window(0..1, RasterWindow::row(9, cols)).unwrap();
        assert_eq!(block[[0, 0, 0]], (9 * cols) as f64);
    }

    #[test]
    fn test_interleaved_page_is_read_by_window() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("interleaved.tif");
        // pixel-interleaved RGB page written by another tool: one band per sample
        let data: Vec<u8> = (0..6 * 5).flat_map(|i| [i as u8, 100 + i as u8, 200]).collect();
        let mut encoder = TiffEncoder::new(File::create(&path).unwrap()).unwrap();
        let mut image = encoder.new_image::<tiff::encoder::colortype::RGB8>(6, 5).unwrap();
        image.rows_per_strip(2).unwrap();
        image.write_data(&data).unwrap();

        let source = GeoTiffSource::open(&path).unwrap();
        assert_eq!(source.grid_info().band_count, 3);
        let block = source.read_window(0..3, RasterWindow::new(1, 2, 2, 3)).unwrap();
        assert_eq!(block[[0, 0, 0]], 8.0);
        assert_eq!(block[[1, 1, 2]], 100.0 + 16.0);
        assert_eq!(block[[2, 1, 1]], 200.0);
    }

    #[test]
    fn test_rotated_transform_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rotated.tif");
        let mut info = grid(1);
        info.transform = GeoTransform::from_gdal([100.0, 2.0, 0.5, 200.0, 0.25, -2.0]);

        let mut sink = GeoTiffSink::create(&path, &info, PixelType::Float32).unwrap();
        sink.flush().unwrap();

        let source = GeoTiffSource::open(&path).unwrap();
        assert_eq!(source.grid_info().transform, info.transform);
    }

    #[test]
    fn test_unwritable_path() {
        let info = grid(1);
        let err = GeoTiffSink::create(Path::new("/nonexistent/dir/out.tif"), &info, PixelType::Byte).unwrap_err();
        assert!(matches!(err, Error::Writer { .. }));
    }
}
