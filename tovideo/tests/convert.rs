//! Conversion of DICOM directories into PNG files,
//! over small synthetic images written to temporary directories.

use std::fs;
use std::path::{Path, PathBuf};

use dicom_core::{DataElement, PrimitiveValue, VR, dicom_value, value::DataSetSequence};
use dicom_dictionary_std::tags;
use dicom_object::{FileMetaTableBuilder, InMemDicomObject, mem::InMemElement};
use dicom_tovideo::{ConversionOptions, ConvertError, ErrorKind, convert_dir, convert_file};
use image::ColorType;
use rstest::rstest;

/// Pixel data samples of a synthetic image.
enum Samples<'a> {
    Unsigned(&'a [u16]),
    Signed(&'a [i16]),
}

/// Write a single-frame 16-bit MONOCHROME2 DICOM file
/// in Explicit VR Little Endian.
fn write_image(
    path: &Path,
    rows: u16,
    cols: u16,
    samples: Samples,
    extra: Vec<InMemElement>,
) {
    let (pixel_representation, pixeldata): (u16, Vec<u8>) = match samples {
        Samples::Unsigned(s) => (0, s.iter().flat_map(|v| v.to_le_bytes()).collect()),
        Samples::Signed(s) => (1, s.iter().flat_map(|v| v.to_le_bytes()).collect()),
    };

    let mut obj = InMemDicomObject::from_element_iter([
        DataElement::new(tags::ROWS, VR::US, PrimitiveValue::from(rows)),
        DataElement::new(tags::COLUMNS, VR::US, PrimitiveValue::from(cols)),
        DataElement::new(tags::SAMPLES_PER_PIXEL, VR::US, PrimitiveValue::from(1_u16)),
        DataElement::new(
            tags::PHOTOMETRIC_INTERPRETATION,
            VR::CS,
            PrimitiveValue::from("MONOCHROME2"),
        ),
        DataElement::new(tags::BITS_ALLOCATED, VR::US, PrimitiveValue::from(16_u16)),
        DataElement::new(tags::BITS_STORED, VR::US, PrimitiveValue::from(16_u16)),
        DataElement::new(tags::HIGH_BIT, VR::US, PrimitiveValue::from(15_u16)),
        DataElement::new(
            tags::PIXEL_REPRESENTATION,
            VR::US,
            PrimitiveValue::from(pixel_representation),
        ),
    ]);
    for elem in extra {
        obj.put(elem);
    }
    obj.put(DataElement::new(
        tags::PIXEL_DATA,
        VR::OW,
        PrimitiveValue::from(pixeldata),
    ));

    let meta = FileMetaTableBuilder::new()
        .media_storage_sop_class_uid("1.2.840.10008.5.1.4.1.1.7")
        .media_storage_sop_instance_uid("2.25.221743183549175336412959299516406387775")
        .transfer_syntax("1.2.840.10008.1.2.1");

    obj.with_meta(meta)
        .expect("should build file meta table")
        .write_to_file(path)
        .expect("should write DICOM file");
}

fn write_unsigned(path: &Path, rows: u16, cols: u16, samples: &[u16]) {
    write_image(path, rows, cols, Samples::Unsigned(samples), vec![]);
}

fn read_png(path: &Path) -> (ColorType, (u32, u32), Vec<u8>) {
    let image = image::open(path).expect("should open PNG file");
    let color = image.color();
    let image = image.to_luma8();
    (color, image.dimensions(), image.into_raw())
}

fn listing(dir: &Path) -> Vec<String> {
    let mut names: Vec<_> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[test]
fn converts_dicom_and_ignores_other_files() {
    let dir = tempfile::tempdir().unwrap();
    let staging = dir.path().join("PNG");

    // 0 to 3500 in steps of 250, then the maximum of 4000
    let mut samples: Vec<u16> = (0..16).map(|i| i * 250).collect();
    samples[15] = 4000;
    write_unsigned(&dir.path().join("A.dcm"), 4, 4, &samples);
    fs::write(dir.path().join("B.txt"), "not an image").unwrap();

    let summary = convert_dir(dir.path(), &staging, &ConversionOptions::new()).unwrap();

    assert!(summary.is_success());
    assert_eq!(summary.converted, vec![staging.join("A.png")]);
    assert_eq!(summary.skipped, 1);
    assert_eq!(listing(&staging), vec!["A.png"]);

    let (color, dimensions, pixels) = read_png(&staging.join("A.png"));
    assert_eq!(color, ColorType::L8);
    assert_eq!(dimensions, (4, 4));
    assert_eq!(pixels.iter().copied().max(), Some(255));
    assert_eq!(pixels[0], 0);
    // the source maximum is the last sample
    assert_eq!(pixels[15], 255);
}

#[test]
fn all_zero_image_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let staging = dir.path().join("PNG");
    write_unsigned(&dir.path().join("C.dcm"), 2, 2, &[0; 4]);

    let summary = convert_dir(dir.path(), &staging, &ConversionOptions::new()).unwrap();

    assert!(!summary.is_success());
    assert!(summary.converted.is_empty());
    assert_eq!(summary.failed.len(), 1);
    let (file, e) = &summary.failed[0];
    assert_eq!(file, &dir.path().join("C.dcm"));
    assert_eq!(e.kind(), ErrorKind::Normalization);
    assert!(!staging.join("C.png").exists());
}

#[test]
fn failures_do_not_stop_the_batch() {
    let dir = tempfile::tempdir().unwrap();
    let staging = dir.path().join("PNG");
    fs::write(dir.path().join("0-corrupt.dcm"), b"definitely not DICOM").unwrap();
    write_unsigned(&dir.path().join("1-zero.dcm"), 1, 2, &[0, 0]);
    write_unsigned(&dir.path().join("2-good.dcm"), 1, 2, &[10, 20]);

    let summary = convert_dir(dir.path(), &staging, &ConversionOptions::new()).unwrap();

    assert_eq!(summary.converted, vec![staging.join("2-good.png")]);
    let kinds: Vec<_> = summary.failed.iter().map(|(_, e)| e.kind()).collect();
    assert_eq!(kinds, vec![ErrorKind::Decode, ErrorKind::Normalization]);
    assert!(matches!(summary.failed[0].1, ConvertError::OpenFile { .. }));
    assert_eq!(listing(&staging), vec!["2-good.png"]);
}

#[test]
fn dotted_file_names_keep_distinct_outputs() {
    let dir = tempfile::tempdir().unwrap();
    let staging = dir.path().join("PNG");
    write_unsigned(&dir.path().join("1.2.3.dcm"), 1, 2, &[1, 2]);
    write_unsigned(&dir.path().join("1.2.4.dcm"), 1, 2, &[2, 1]);

    let summary = convert_dir(dir.path(), &staging, &ConversionOptions::new()).unwrap();

    assert_eq!(
        summary.converted,
        vec![staging.join("1.2.3.png"), staging.join("1.2.4.png")]
    );
    assert_eq!(listing(&staging), vec!["1.2.3.png", "1.2.4.png"]);
    assert_eq!(read_png(&staging.join("1.2.3.png")).2, vec![127, 255]);
    assert_eq!(read_png(&staging.join("1.2.4.png")).2, vec![255, 127]);
}

#[test]
fn conversion_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let staging = dir.path().join("PNG");
    write_unsigned(&dir.path().join("A.dcm"), 2, 3, &[0, 100, 200, 300, 400, 500]);

    convert_dir(dir.path(), &staging, &ConversionOptions::new()).unwrap();
    let first = fs::read(staging.join("A.png")).unwrap();
    convert_dir(dir.path(), &staging, &ConversionOptions::new()).unwrap();
    let second = fs::read(staging.join("A.png")).unwrap();

    assert_eq!(first, second);
    assert_eq!(listing(&staging), vec!["A.png"]);
}

#[test]
fn missing_input_directory() {
    let dir = tempfile::tempdir().unwrap();
    let res = convert_dir(
        &dir.path().join("missing"),
        &dir.path().join("PNG"),
        &ConversionOptions::new(),
    );
    assert!(matches!(res, Err(dicom_tovideo::Error::Scan { .. })));
}

#[rstest]
#[case("A.dcm", true)]
#[case("A.DCM", true)]
#[case("A.dcm.bak", false)]
#[case("A.txt", false)]
fn only_recognized_extensions_are_converted(#[case] name: &str, #[case] converted: bool) {
    let dir = tempfile::tempdir().unwrap();
    let staging = dir.path().join("PNG");
    write_unsigned(&dir.path().join(name), 1, 2, &[1, 2]);

    let summary = convert_dir(dir.path(), &staging, &ConversionOptions::new()).unwrap();

    assert_eq!(summary.converted.len(), usize::from(converted));
    assert_eq!(summary.skipped, usize::from(!converted));
    assert!(summary.failed.is_empty());
}

#[test]
fn negative_samples_are_clipped() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("signed.dcm");
    write_image(&file, 1, 4, Samples::Signed(&[-100, 0, 50, 100]), vec![]);

    let output = convert_file(&file, dir.path(), &ConversionOptions::new()).unwrap();

    assert_eq!(output, dir.path().join("signed.png"));
    let (_, _, pixels) = read_png(&output);
    assert_eq!(pixels, vec![0, 0, 127, 255]);
}

#[test]
fn window_level_is_applied() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("window.dcm");
    write_image(
        &file,
        1,
        5,
        Samples::Unsigned(&[0, 500, 1000, 1500, 4000]),
        vec![
            DataElement::new(tags::BITS_STORED, VR::US, PrimitiveValue::from(12_u16)),
            DataElement::new(tags::HIGH_BIT, VR::US, PrimitiveValue::from(11_u16)),
            DataElement::new(tags::WINDOW_CENTER, VR::DS, PrimitiveValue::from("1000")),
            DataElement::new(tags::WINDOW_WIDTH, VR::DS, PrimitiveValue::from("1000")),
            DataElement::new(
                tags::VOILUT_FUNCTION,
                VR::CS,
                PrimitiveValue::from("LINEAR_EXACT"),
            ),
        ],
    );

    let output = convert_file(&file, dir.path(), &ConversionOptions::new()).unwrap();

    let (_, _, pixels) = read_png(&output);
    assert_eq!(pixels, vec![0, 0, 127, 255, 255]);
}

#[test]
fn second_window_can_be_selected() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("window.dcm");
    write_image(
        &file,
        1,
        3,
        Samples::Unsigned(&[0, 2000, 4000]),
        vec![
            DataElement::new(
                tags::WINDOW_CENTER,
                VR::DS,
                dicom_value!(Strs, ["2000", "40000"]),
            ),
            DataElement::new(
                tags::WINDOW_WIDTH,
                VR::DS,
                dicom_value!(Strs, ["1", "10"]),
            ),
        ],
    );

    // first window: a threshold at 2000
    let output = convert_file(&file, dir.path(), &ConversionOptions::new()).unwrap();
    let (_, _, pixels) = read_png(&output);
    assert_eq!(pixels, vec![0, 255, 255]);

    // second window: everything is below it
    let options = ConversionOptions::new().with_window_index(1);
    let err = convert_file(&file, dir.path(), &options).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Normalization);

    // no third window
    let options = ConversionOptions::new().with_window_index(2);
    let err = convert_file(&file, dir.path(), &options).unwrap_err();
    assert!(matches!(err, ConvertError::Voi { .. }));
    assert_eq!(err.kind(), ErrorKind::Decode);
}

#[test]
fn voi_lut_table_is_applied() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("lut.dcm");
    let item = InMemDicomObject::from_element_iter([
        DataElement::new(tags::LUT_DESCRIPTOR, VR::US, dicom_value!(U16, [4, 0, 16])),
        DataElement::new(tags::LUT_DATA, VR::US, dicom_value!(U16, [0, 10, 20, 40])),
    ]);
    write_image(
        &file,
        1,
        5,
        Samples::Unsigned(&[0, 1, 2, 3, 9]),
        vec![DataElement::new(
            tags::VOILUT_SEQUENCE,
            VR::SQ,
            DataSetSequence::from(vec![item]),
        )],
    );

    let output = convert_file(&file, dir.path(), &ConversionOptions::new()).unwrap();

    let (_, _, pixels) = read_png(&output);
    assert_eq!(pixels, vec![0, 63, 127, 255, 255]);
}

#[test]
fn malformed_window_is_a_decode_error() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("bad-window.dcm");
    write_image(
        &file,
        1,
        2,
        Samples::Unsigned(&[0, 100]),
        vec![
            DataElement::new(tags::WINDOW_CENTER, VR::DS, PrimitiveValue::from("50")),
            DataElement::new(tags::WINDOW_WIDTH, VR::DS, PrimitiveValue::from("0")),
        ],
    );

    let err = convert_file(&file, dir.path(), &ConversionOptions::new()).unwrap_err();
    assert!(matches!(err, ConvertError::Voi { .. }));
    assert_eq!(err.kind(), ErrorKind::Decode);
    assert!(!dir.path().join("bad-window.png").exists());
}

#[test]
fn frames_can_be_selected() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("frames.dcm");
    write_image(
        &file,
        1,
        2,
        Samples::Unsigned(&[0, 10, 30, 15]),
        vec![DataElement::new(
            tags::NUMBER_OF_FRAMES,
            VR::IS,
            PrimitiveValue::from("2"),
        )],
    );

    let options = ConversionOptions::new().with_frame(1);
    let output = convert_file(&file, dir.path(), &options).unwrap();
    let (_, dimensions, pixels) = read_png(&output);
    assert_eq!(dimensions, (2, 1));
    assert_eq!(pixels, vec![255, 127]);

    let options = ConversionOptions::new().with_frame(2);
    let err = convert_file(&file, dir.path(), &options).unwrap_err();
    assert!(matches!(
        err,
        ConvertError::FrameOutOfRange {
            frame: 2,
            frames: 2
        }
    ));
}

#[test]
fn color_images_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("rgb.dcm");
    write_image(
        &file,
        1,
        1,
        Samples::Unsigned(&[1, 2, 3]),
        vec![
            DataElement::new(tags::SAMPLES_PER_PIXEL, VR::US, PrimitiveValue::from(3_u16)),
            DataElement::new(
                tags::PHOTOMETRIC_INTERPRETATION,
                VR::CS,
                PrimitiveValue::from("RGB"),
            ),
        ],
    );

    let err = convert_file(&file, dir.path(), &ConversionOptions::new()).unwrap_err();
    assert!(matches!(
        err,
        ConvertError::UnsupportedSamplesPerPixel { spp: 3 }
    ));
    assert_eq!(err.kind(), ErrorKind::Decode);
}

#[test]
fn unwritable_output_is_a_write_error() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("A.dcm");
    write_unsigned(&file, 1, 2, &[1, 2]);

    let staging: PathBuf = dir.path().join("missing").join("PNG");
    let err = convert_file(&file, &staging, &ConversionOptions::new()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Write);
}
