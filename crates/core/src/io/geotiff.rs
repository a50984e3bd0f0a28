//! Native GeoTIFF reading/writing built on the `tiff` crate.
//!
//! Handles single-band rasters of any integer or float sample type on read
//! and writes 32- or 64-bit float samples. Georeferencing tags are carried
//! through unchanged:
//!
//! - 33550 ModelPixelScale + 33922 ModelTiepoint, or 34264 ModelTransformation
//! - 34735/34736/34737 GeoKey directory and parameter tags
//! - 42113 GDAL_NODATA

use crate::error::{Error, Result};
use crate::raster::{GeoKeys, GeoTransform, Georef, Raster};
use std::fs::File;
use std::io::{BufReader, Read, Seek, Write};
use std::path::Path;
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::encoder::colortype::{ColorType, Gray32Float, Gray64Float};
use tiff::encoder::compression::Lzw;
use tiff::encoder::{DirectoryEncoder, TiffEncoder, TiffKind, TiffValue};
use tiff::tags::Tag;

const MODEL_PIXEL_SCALE: u16 = 33550;
const MODEL_TIEPOINT: u16 = 33922;
const MODEL_TRANSFORMATION: u16 = 34264;
const GEO_KEY_DIRECTORY: u16 = 34735;
const GEO_DOUBLE_PARAMS: u16 = 34736;
const GEO_ASCII_PARAMS: u16 = 34737;
const GDAL_NODATA: u16 = 42113;

/// Resolve a numeric tag code to the variant the decoder indexes it under
fn tag(code: u16) -> Tag {
    Tag::from_u16_exhaustive(code)
}

/// Storage precision of written samples
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplePrecision {
    F32,
    F64,
}

impl SamplePrecision {
    pub fn bytes_per_sample(self) -> u64 {
        match self {
            SamplePrecision::F32 => 4,
            SamplePrecision::F64 => 8,
        }
    }
}

/// Options for writing GeoTIFF files
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeOptions {
    pub precision: SamplePrecision,
    /// Write a BigTIFF container (64-bit offsets)
    pub bigtiff: bool,
    /// LZW compression
    pub compress: bool,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            precision: SamplePrecision::F32,
            bigtiff: false,
            compress: true,
        }
    }
}

fn open(path: &Path) -> Result<BufReader<File>> {
    let file = File::open(path).map_err(|source| Error::Open {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(BufReader::new(file))
}

/// Read a single-band GeoTIFF into a Raster.
///
/// Samples are returned as stored; the GDAL_NODATA sentinel is recorded on
/// the raster but not applied.
pub fn read_geotiff<P: AsRef<Path>>(path: P) -> Result<Raster> {
    let path = path.as_ref();
    decode_geotiff(open(path)?, path)
}

/// Read only the header of a GeoTIFF and return its (rows, cols)
pub fn read_geotiff_dimensions<P: AsRef<Path>>(path: P) -> Result<(usize, usize)> {
    let path = path.as_ref();
    let mut decoder = Decoder::new(open(path)?).map_err(|e| Error::tiff(path, e))?;
    let (width, height) = decoder.dimensions().map_err(|e| Error::tiff(path, e))?;
    Ok((height as usize, width as usize))
}

fn decode_geotiff<R: Read + Seek>(reader: R, path: &Path) -> Result<Raster> {
    let mut decoder = Decoder::new(reader)
        .map_err(|e| Error::tiff(path, e))?
        .with_limits(Limits::unlimited());

    let (width, height) = decoder.dimensions().map_err(|e| Error::tiff(path, e))?;
    let rows = height as usize;
    let cols = width as usize;

    match decoder.colortype().map_err(|e| Error::tiff(path, e))? {
        tiff::ColorType::Gray(_) => {}
        other => {
            return Err(Error::UnsupportedDataType(format!(
                "{}: expected a single-band raster, found {:?}",
                path.display(),
                other
            )));
        }
    }

    let decoded = decoder.read_image().map_err(|e| Error::tiff(path, e))?;
    let single_precision = matches!(decoded, DecodingResult::F32(_));
    let data: Vec<f64> = match decoded {
        DecodingResult::F32(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::F64(buf) => buf,
        DecodingResult::U8(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::U16(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::U32(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::I8(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::I16(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::I32(buf) => buf.into_iter().map(f64::from).collect(),
        _ => {
            return Err(Error::UnsupportedDataType(format!(
                "{}: unsupported TIFF sample format",
                path.display()
            )));
        }
    };

    if data.len() != rows * cols {
        return Err(Error::InvalidDimensions {
            width: cols,
            height: rows,
        });
    }

    let mut raster = Raster::from_vec(data, rows, cols)?;
    raster.set_georef(read_georef(&mut decoder));
    raster.set_nodata(read_nodata(&mut decoder));
    raster.set_single_precision(single_precision);

    Ok(raster)
}

fn read_georef<R: Read + Seek>(decoder: &mut Decoder<R>) -> Georef {
    let scale = decoder.get_tag_f64_vec(tag(MODEL_PIXEL_SCALE)).ok();
    let tiepoint = decoder.get_tag_f64_vec(tag(MODEL_TIEPOINT)).ok();

    let transform = match (scale, tiepoint) {
        (Some(scale), Some(tiepoint)) => GeoTransform::from_scale_tiepoint(&scale, &tiepoint),
        _ => None,
    }
    .or_else(|| {
        decoder
            .get_tag_f64_vec(tag(MODEL_TRANSFORMATION))
            .ok()
            .and_then(|m| GeoTransform::from_model_transformation(&m))
    })
    .unwrap_or_default();

    let geokeys = decoder
        .get_tag_u16_vec(tag(GEO_KEY_DIRECTORY))
        .ok()
        .map(|directory| GeoKeys {
            directory,
            double_params: decoder.get_tag_f64_vec(tag(GEO_DOUBLE_PARAMS)).ok(),
            ascii_params: decoder
                .get_tag_ascii_string(tag(GEO_ASCII_PARAMS))
                .ok()
                .map(|s| s.trim_end_matches('\0').to_string()),
        });

    Georef { transform, geokeys }
}

fn read_nodata<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<f64> {
    let s = decoder.get_tag_ascii_string(tag(GDAL_NODATA)).ok()?;
    s.trim_end_matches('\0').trim().parse::<f64>().ok()
}

/// Write a Raster to a GeoTIFF file.
///
/// `NaN` cells are the missing marker. GDAL_NODATA is written as `nan`
/// unless the raster carries a numeric sentinel of its own.
pub fn write_geotiff<P: AsRef<Path>>(raster: &Raster, path: P, options: EncodeOptions) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path)?;
    let mut writer = std::io::BufWriter::new(file);
    encode_geotiff(raster, &mut writer, options).map_err(|e| Error::tiff(path, e))?;
    writer.flush()?;
    writer.get_ref().sync_all()?;
    Ok(())
}

/// Encode a Raster as GeoTIFF into any `Write + Seek` sink
pub fn encode_geotiff<W: Write + Seek>(
    raster: &Raster,
    writer: W,
    options: EncodeOptions,
) -> tiff::TiffResult<()> {
    if options.bigtiff {
        let mut encoder = TiffEncoder::new_big(writer)?;
        encode_samples(&mut encoder, raster, options)
    } else {
        let mut encoder = TiffEncoder::new(writer)?;
        encode_samples(&mut encoder, raster, options)
    }
}

fn encode_samples<W: Write + Seek, K: TiffKind>(
    encoder: &mut TiffEncoder<W, K>,
    raster: &Raster,
    options: EncodeOptions,
) -> tiff::TiffResult<()> {
    match options.precision {
        SamplePrecision::F32 => {
            let data: Vec<f32> = raster.data().iter().map(|&v| v as f32).collect();
            encode_image::<W, K, Gray32Float>(encoder, raster, &data, options.compress)
        }
        SamplePrecision::F64 => match raster.data().as_slice() {
            Some(data) => encode_image::<W, K, Gray64Float>(encoder, raster, data, options.compress),
            None => {
                let data: Vec<f64> = raster.data().iter().copied().collect();
                encode_image::<W, K, Gray64Float>(encoder, raster, &data, options.compress)
            }
        },
    }
}

fn encode_image<W, K, C>(
    encoder: &mut TiffEncoder<W, K>,
    raster: &Raster,
    data: &[C::Inner],
    compress: bool,
) -> tiff::TiffResult<()>
where
    W: Write + Seek,
    K: TiffKind,
    C: ColorType,
    [C::Inner]: TiffValue,
{
    let (rows, cols) = raster.shape();
    let (width, height) = (cols as u32, rows as u32);

    if compress {
        let mut image = encoder.new_image_with_compression::<C, Lzw>(width, height, Lzw::default())?;
        write_geotags(image.encoder(), raster)?;
        image.write_data(data)
    } else {
        let mut image = encoder.new_image::<C>(width, height)?;
        write_geotags(image.encoder(), raster)?;
        image.write_data(data)
    }
}

fn write_geotags<W: Write + Seek, K: TiffKind>(
    dir: &mut DirectoryEncoder<'_, W, K>,
    raster: &Raster,
) -> tiff::TiffResult<()> {
    let georef = raster.georef();
    let gt = &georef.transform;
    if gt.is_north_up() {
        dir.write_tag(tag(MODEL_PIXEL_SCALE), &gt.to_scale()[..])?;
        dir.write_tag(tag(MODEL_TIEPOINT), &gt.to_tiepoint()[..])?;
    } else {
        dir.write_tag(tag(MODEL_TRANSFORMATION), &gt.to_model_transformation()[..])?;
    }

    let minimal;
    let keys = match &georef.geokeys {
        Some(keys) => keys,
        None => {
            minimal = GeoKeys::minimal_projected();
            &minimal
        }
    };
    dir.write_tag(tag(GEO_KEY_DIRECTORY), keys.directory.as_slice())?;
    if let Some(doubles) = &keys.double_params {
        dir.write_tag(tag(GEO_DOUBLE_PARAMS), doubles.as_slice())?;
    }
    if let Some(ascii) = &keys.ascii_params {
        dir.write_tag(tag(GEO_ASCII_PARAMS), ascii.as_str())?;
    }

    let nodata = match raster.nodata() {
        Some(nd) if !nd.is_nan() => nd.to_string(),
        _ => "nan".to_string(),
    };
    dir.write_tag(tag(GDAL_NODATA), nodata.as_str())?;
    Ok(())
}
