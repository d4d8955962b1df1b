use std::fs;
use std::path::PathBuf;

use bitreel::extractionlogics::from_frame_stream;
use bitreel::geometry::GeometryError;
use bitreel::{
    pad, run_job, to_frame_stream, AppMode, ArchiveError, ArchiveFormat, BackendKind,
    CancelToken, ClassificationBands, DecodeStrategy, Error, FrameGeometry, Job, JobMonitor,
    JobOutcome, Manifest,
};

fn get_test_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("bitreel-it-{}-{}", name, std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    dir
}

fn get_unit_test_job(mode: AppMode, inputs: Vec<PathBuf>, output: PathBuf) -> Job {
    Job {
        input_paths: inputs,
        output_directory: output,
        mode,
        geometry: FrameGeometry::derive(128, 64, 8, 8).unwrap(),
        framerate: 30,
        codec: "libx264".to_string(),
        backend: BackendKind::Raw,
        decode_strategy: DecodeStrategy::Averaged,
        archive_format: ArchiveFormat::Zip,
        bands: ClassificationBands::default(),
        output_name: None,
        ffmpeg_path: "ffmpeg".to_string(),
    }
}

fn get_unit_test_data(number_of_byte: u64) -> Vec<u8> {
    (0..number_of_byte).map(|i| ((i % 65) + 65) as u8).collect()
}

fn encode(dir: &PathBuf, inputs: Vec<PathBuf>) -> (PathBuf, PathBuf) {
    let job = get_unit_test_job(AppMode::Encode, inputs, dir.join("video"));
    match run_job(&job, &JobMonitor::default()).unwrap() {
        JobOutcome::Encoded {
            video, manifest, ..
        } => (video, manifest),
        other => panic!("expected an encoded outcome, got {:?}", other),
    }
}

#[test]
fn test_single_byte_fills_one_frame() {
    let geometry = FrameGeometry::derive(64, 64, 8, 8).unwrap();
    let payload = pad(vec![0xFF], geometry.bytes_per_frame()).unwrap();
    let frames: Vec<_> = to_frame_stream(&payload, &geometry).collect();
    assert_eq!(frames.len(), 1);
    for index in 0..64u32 {
        assert_eq!(frames[0].get(index % 8, index / 8), index < 8);
    }
    assert_eq!(
        from_frame_stream(frames, &geometry),
        vec![0xFF, 0, 0, 0, 0, 0, 0, 0]
    );
}

#[test]
fn test_pack_without_input() {
    assert!(matches!(
        ArchiveFormat::Zip.pack(&[]),
        Err(ArchiveError::NoInput)
    ));
}

#[test]
fn test_geometry_not_divisible() {
    assert!(matches!(
        FrameGeometry::derive(100, 64, 8, 8),
        Err(GeometryError::NotDivisible { .. })
    ));
}

#[test]
fn test_encode_decode_several_files_averaged() {
    let dir = get_test_dir("averaged");
    let first = dir.join("first.txt");
    let second = dir.join("second.bin");
    fs::write(&first, get_unit_test_data(3000)).unwrap();
    fs::write(&second, [0u8, 255, 1, 254]).unwrap();
    let (video, manifest) = encode(&dir, vec![first, second]);
    assert_eq!(video, dir.join("video").join("first.braw"));
    assert!(manifest.exists());

    let job = get_unit_test_job(AppMode::Decode, vec![video], dir.join("restored"));
    let outcome = run_job(&job, &JobMonitor::default()).unwrap();
    let JobOutcome::Decoded { files, .. } = outcome else {
        panic!("expected a decoded outcome");
    };
    assert_eq!(files.len(), 2);
    assert_eq!(
        fs::read(dir.join("restored").join("first.txt")).unwrap(),
        get_unit_test_data(3000)
    );
    assert_eq!(
        fs::read(dir.join("restored").join("second.bin")).unwrap(),
        vec![0u8, 255, 1, 254]
    );
}

#[test]
fn test_encode_decode_sampled() {
    let dir = get_test_dir("sampled");
    let input = dir.join("data.txt");
    fs::write(&input, get_unit_test_data(777)).unwrap();
    let (video, _) = encode(&dir, vec![input]);

    let mut job = get_unit_test_job(AppMode::Decode, vec![video], dir.join("restored"));
    job.decode_strategy = DecodeStrategy::Sampled;
    run_job(&job, &JobMonitor::default()).unwrap();
    assert_eq!(
        fs::read(dir.join("restored").join("data.txt")).unwrap(),
        get_unit_test_data(777)
    );
}

#[test]
fn test_decode_uses_manifest_geometry() {
    let dir = get_test_dir("manifest-geometry");
    let input = dir.join("data.txt");
    fs::write(&input, get_unit_test_data(100)).unwrap();
    let (video, _) = encode(&dir, vec![input]);

    let mut job = get_unit_test_job(AppMode::Decode, vec![video], dir.join("restored"));
    job.geometry = FrameGeometry::derive(64, 64, 4, 4).unwrap();
    run_job(&job, &JobMonitor::default()).unwrap();
    assert!(dir.join("restored").join("data.txt").exists());
}

#[test]
fn test_cancelled_job_removes_outputs() {
    let dir = get_test_dir("cancelled");
    let input = dir.join("data.txt");
    fs::write(&input, get_unit_test_data(500)).unwrap();
    let token = CancelToken::new();
    token.cancel();
    let job = get_unit_test_job(AppMode::Encode, vec![input], dir.join("video"));
    let result = run_job(&job, &JobMonitor::new(token));
    assert!(matches!(result, Err(Error::Cancelled)));
    assert!(!dir.join("video").join("data.braw").exists());
}

#[test]
fn test_decode_truncated_video() {
    let dir = get_test_dir("truncated");
    let input = dir.join("data.txt");
    fs::write(&input, get_unit_test_data(2000)).unwrap();
    let (video, _) = encode(&dir, vec![input]);
    let bytes = fs::read(&video).unwrap();
    fs::write(&video, &bytes[..bytes.len() / 2]).unwrap();

    let job = get_unit_test_job(AppMode::Decode, vec![video], dir.join("restored"));
    assert!(run_job(&job, &JobMonitor::default()).is_err());
    assert!(!dir.join("restored").join("data.txt").exists());
}

#[test]
fn test_manifest_sits_next_to_video() {
    let dir = get_test_dir("sidecar");
    let input = dir.join("data.txt");
    fs::write(&input, get_unit_test_data(10)).unwrap();
    let (video, manifest) = encode(&dir, vec![input]);
    assert_eq!(manifest, Manifest::path_for(&video));
    let recorded = Manifest::read(&manifest).unwrap();
    assert_eq!(recorded.geometry, FrameGeometry::derive(128, 64, 8, 8).unwrap());
    assert_eq!(recorded.archive, ArchiveFormat::Zip);
}

#[test]
fn test_decode_drops_extra_trailing_frames() {
    let dir = get_test_dir("extra-frames");
    let input = dir.join("data.txt");
    fs::write(&input, get_unit_test_data(1500)).unwrap();
    let (video, _) = encode(&dir, vec![input]);
    let geometry = FrameGeometry::derive(128, 64, 8, 8).unwrap();
    let mut bytes = fs::read(&video).unwrap();
    bytes.extend(vec![0xFF; geometry.monob_frame_len() * 2]);
    fs::write(&video, bytes).unwrap();

    for strategy in [DecodeStrategy::Averaged, DecodeStrategy::Sampled] {
        let restored = dir.join(format!("restored-{}", strategy));
        let mut job = get_unit_test_job(AppMode::Decode, vec![video.clone()], restored.clone());
        job.decode_strategy = strategy;
        run_job(&job, &JobMonitor::default()).unwrap();
        assert_eq!(
            fs::read(restored.join("data.txt")).unwrap(),
            get_unit_test_data(1500)
        );
    }
}

#[test]
fn test_decode_refuses_to_overwrite_existing_file() {
    let dir = get_test_dir("overwrite");
    let input = dir.join("data.txt");
    fs::write(&input, get_unit_test_data(300)).unwrap();
    let (video, _) = encode(&dir, vec![input]);
    let restored = dir.join("restored");
    fs::create_dir_all(&restored).unwrap();
    fs::write(restored.join("data.txt"), b"keep me").unwrap();

    let job = get_unit_test_job(AppMode::Decode, vec![video], restored.clone());
    let result = run_job(&job, &JobMonitor::default());
    assert!(matches!(result, Err(Error::Archive(ArchiveError::Exists(_)))));
    assert_eq!(fs::read(restored.join("data.txt")).unwrap(), b"keep me");
}
