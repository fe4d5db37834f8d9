//! End-to-end round-trip tests for each format's reader/writer pair,
//! covering the scenarios named in spec.md's "Worked examples" section.
//! Scenario F (swap spill/compact) is exercised by `src/sample/swap.rs`'s
//! own unit tests, not repeated here.

use std::fs::File;
use std::io::Cursor;
use std::sync::{Arc, Mutex};

use instpatch::dls::{self, DlsMode};
use instpatch::error::{Error, FormatError};
use instpatch::file::{FileHandle, SharedFileHandle};
use instpatch::fourcc;
use instpatch::riff::{ChunkKind, RiffReader};
use instpatch::sample::store::{SampleFormat, SwapStore};
use instpatch::sample::SampleData;
use instpatch::sf2::{self, fourcc as sf2fourcc, Sf2WriteOptions};
use instpatch::tree::generator::id as gen_id;
use instpatch::tree::{Base, ChannelRole, Instrument, InstZone, Preset, PresetZone, Sample};

fn dummy_shared() -> SharedFileHandle {
    Arc::new(Mutex::new(FileHandle::new(tempfile::tempfile().unwrap())))
}

fn reopen_shared(path: &std::path::Path) -> SharedFileHandle {
    Arc::new(Mutex::new(FileHandle::open_read(path).unwrap()))
}

/// Writes `base` as SF2 to a fresh temp file on disk (a real `File`, not a
/// `Cursor`, so the returned path can be reopened through `FileHandle` for
/// the read-back half of the round trip) and returns the path.
fn write_sf2(base: &Base, options: Sf2WriteOptions) -> tempfile::TempPath {
    let tmp = tempfile::NamedTempFile::new().unwrap();
    let file = File::create(tmp.path()).unwrap();
    sf2::write_with_options(base, file, dummy_shared(), options).unwrap();
    tmp.into_temp_path()
}

fn silent_sample(frames: u32) -> Sample {
    let store = SwapStore::new(SampleFormat::Pcm16, frames, 44100).unwrap();
    Sample {
        name: "Sine".to_string(),
        rate: 44100,
        root_note: 60,
        fine_tune: 0,
        loop_start: 0,
        loop_end: frames,
        channel_role: ChannelRole::Mono,
        linked: None,
        data: Arc::new(SampleData::new(Box::new(store))),
        unique_id: None,
        opaque_chunks: Vec::new(),
    }
}

/// Scenario A — SF2 round trip: one sample, one instrument with one zone
/// spanning the whole keyboard, one preset referencing it. After the round
/// trip every index comes back exactly as written.
#[test]
fn sf2_round_trip_basic() {
    let mut base = Base::new();
    base.samples.push(silent_sample(100));

    let mut inst = Instrument { name: "SineInst".to_string(), ..Default::default() };
    let mut zone = InstZone { sample_ref: Some(0), ..Default::default() };
    zone.generators.set_range(gen_id::KEY_RANGE, 0, 127);
    inst.zones.push(zone);
    base.instruments.push(inst);

    let mut preset = Preset { name: "SinePre".to_string(), bank: 0, program: 0, ..Default::default() };
    preset.zones.push(PresetZone { inst_ref: Some(0), ..Default::default() });
    base.presets.push(preset);

    let path = write_sf2(&base, Sf2WriteOptions::default());
    let shared = reopen_shared(&path);
    let got = sf2::read(shared).unwrap();

    assert_eq!(got.presets.len(), 1);
    assert_eq!(got.instruments.len(), 1);
    assert_eq!(got.samples.len(), 1);
    assert_eq!(got.presets[0].zones[0].inst_ref, Some(0));
    assert_eq!(got.instruments[0].zones[0].sample_ref, Some(0));
    assert_eq!(got.samples[0].frame_count(), 100);
}

/// Scenario B — 24-bit SF2. A 3-byte-per-frame store holding one positive
/// and one negative value (two's complement, little-endian) round-trips
/// through `smpl`/`sm24` and back through a `Split24Store` unchanged.
/// `shdr` frame ranges under 4 frames are treated as invalid by the reader,
/// so two trailing zero frames pad the sample out.
#[test]
fn sf2_round_trip_24_bit() {
    fn le24(v: i32) -> [u8; 3] {
        let u = (v as u32) & 0xFF_FFFF;
        [u as u8, (u >> 8) as u8, (u >> 16) as u8]
    }

    let v0: i32 = 0x010203;
    let v1: i32 = -0x010203;

    let store = SwapStore::new(SampleFormat::Pcm24, 4, 44100).unwrap();
    let mut raw = Vec::new();
    raw.extend_from_slice(&le24(v0));
    raw.extend_from_slice(&le24(v1));
    raw.extend_from_slice(&[0u8; 6]); // two trailing zero frames
    store.alloc.write(0, &raw).unwrap();

    let mut base = Base::new();
    base.samples.push(Sample {
        name: "Bit24".to_string(),
        rate: 44100,
        root_note: 60,
        fine_tune: 0,
        loop_start: 0,
        loop_end: 4,
        channel_role: ChannelRole::Mono,
        linked: None,
        data: Arc::new(SampleData::new(Box::new(store))),
        unique_id: None,
        opaque_chunks: Vec::new(),
    });

    let path = write_sf2(&base, Sf2WriteOptions { preserve_24_bit: true });

    // Check the raw smpl/sm24 bytes the writer actually emitted.
    let bytes = std::fs::read(&path).unwrap();
    let mut r = RiffReader::new(Cursor::new(bytes));
    r.start_read().unwrap(); // sfbk
    r.read_chunk_verify(ChunkKind::List, fourcc::riff::INFO).unwrap();
    r.end_chunk().unwrap();
    r.read_chunk_verify(ChunkKind::List, sf2fourcc::SDTA).unwrap();
    let mut smpl_bytes = None;
    let mut sm24_bytes = None;
    while let Some(chunk) = r.read_chunk().unwrap() {
        let data = r.read_bytes(chunk.payload_size() as usize).unwrap();
        if chunk.id == sf2fourcc::SMPL {
            smpl_bytes = Some(data);
        } else if chunk.id == sf2fourcc::SM24 {
            sm24_bytes = Some(data);
        }
        r.end_chunk().unwrap();
    }
    let smpl_bytes = smpl_bytes.unwrap();
    let sm24_bytes = sm24_bytes.unwrap();

    let expected_smpl_0 = u16::from_le_bytes([le24(v0)[1], le24(v0)[2]]);
    let expected_smpl_1 = u16::from_le_bytes([le24(v1)[1], le24(v1)[2]]);
    assert_eq!(u16::from_le_bytes([smpl_bytes[0], smpl_bytes[1]]), expected_smpl_0);
    assert_eq!(u16::from_le_bytes([smpl_bytes[2], smpl_bytes[3]]), expected_smpl_1);
    assert_eq!(sm24_bytes[0], le24(v0)[0]);
    assert_eq!(sm24_bytes[1], le24(v1)[0]);

    // Parse back and read through Split24Store: frames equal the originals.
    let shared = reopen_shared(&path);
    let got = sf2::read(shared).unwrap();
    assert_eq!(got.samples.len(), 1);
    let mut handle = got.samples[0].data.open(SampleFormat::Pcm24).unwrap();
    let mut buf = vec![0u8; 4 * 3];
    handle.read(0, 4, &mut buf).unwrap();
    got.samples[0].data.release();

    let read_v0 = i32::from_le_bytes([buf[0], buf[1], buf[2], if buf[2] & 0x80 != 0 { 0xFF } else { 0 }]);
    let read_v1 = i32::from_le_bytes([buf[3], buf[4], buf[5], if buf[5] & 0x80 != 0 { 0xFF } else { 0 }]);
    assert_eq!(read_v0, v0);
    assert_eq!(read_v1, v1);
}

/// Scenario C — global zone absorption. The instrument's generator-only
/// leading zone (no `SAMPLE_ID`) is pulled into `global_generators` on
/// read, leaving only the sample-referencing zone behind.
#[test]
fn sf2_global_zone_absorption() {
    let mut base = Base::new();
    base.samples.push(silent_sample(100));

    let mut inst = Instrument { name: "GlobalInst".to_string(), ..Default::default() };
    inst.global_generators.set_scalar(gen_id::INITIAL_ATTENUATION, 10);
    let mut zone = InstZone { sample_ref: Some(0), ..Default::default() };
    zone.generators.set_range(gen_id::KEY_RANGE, 0, 127);
    inst.zones.push(zone);
    base.instruments.push(inst);

    let mut preset = Preset { name: "GlobalPre".to_string(), bank: 0, program: 0, ..Default::default() };
    preset.zones.push(PresetZone { inst_ref: Some(0), ..Default::default() });
    base.presets.push(preset);

    let path = write_sf2(&base, Sf2WriteOptions::default());
    let shared = reopen_shared(&path);
    let got = sf2::read(shared).unwrap();

    assert_eq!(got.instruments.len(), 1);
    assert_eq!(got.instruments[0].zones.len(), 1);
    assert_eq!(got.instruments[0].zones[0].sample_ref, Some(0));
    let amount = got.instruments[0].global_generators.get(gen_id::INITIAL_ATTENUATION);
    assert_eq!(amount.and_then(|a| a.as_scalar()), Some(10));
}

/// Scenario D — stereo link fixup. `Base::link_stereo`'s mutual bookkeeping
/// survives an SF2 write/read round trip.
#[test]
fn sf2_stereo_link_round_trip() {
    let mut base = Base::new();
    base.samples.push(silent_sample(100));
    base.samples.push(silent_sample(100));
    base.samples[0].name = "L".to_string();
    base.samples[1].name = "R".to_string();
    base.link_stereo(0, 1);

    let mut inst = Instrument { name: "StereoInst".to_string(), ..Default::default() };
    let mut zl = InstZone { sample_ref: Some(0), ..Default::default() };
    zl.generators.set_range(gen_id::KEY_RANGE, 0, 127);
    let mut zr = InstZone { sample_ref: Some(1), ..Default::default() };
    zr.generators.set_range(gen_id::KEY_RANGE, 0, 127);
    inst.zones.push(zl);
    inst.zones.push(zr);
    base.instruments.push(inst);

    let mut preset = Preset { name: "StereoPre".to_string(), bank: 0, program: 0, ..Default::default() };
    preset.zones.push(PresetZone { inst_ref: Some(0), ..Default::default() });
    base.presets.push(preset);

    let path = write_sf2(&base, Sf2WriteOptions::default());
    let shared = reopen_shared(&path);
    let got = sf2::read(shared).unwrap();

    assert_eq!(got.samples[0].channel_role, ChannelRole::Left);
    assert_eq!(got.samples[1].channel_role, ChannelRole::Right);
    assert_eq!(got.samples[0].linked, Some(1));
    assert_eq!(got.samples[1].linked, Some(0));
}

/// Scenario E — DLS→GIG restart. A root-level `3lnk` chunk (GIG-only) is
/// invisible to DLS's own chunk switch, so it falls to the catch-all arm,
/// which raises `GigDetected` while reading in plain-DLS mode. The caller
/// rewinds the shared file and re-reads in GIG mode, which accepts it as
/// an opaque chunk instead.
#[test]
fn dls_to_gig_restart_on_gig_only_chunk() {
    let mut base = Base::new();
    base.opaque_chunks.push((instpatch::gig::fourcc::THREE_LNK, vec![0u8; instpatch::gig::fourcc::THREE_LNK_SIZE]));

    let tmp = tempfile::NamedTempFile::new().unwrap();
    let file = File::create(tmp.path()).unwrap();
    dls::write(&base, file).unwrap();

    let shared = reopen_shared(tmp.path());

    let err = dls::read(shared.clone(), DlsMode::Dls).unwrap_err();
    assert!(matches!(err, Error::Format(FormatError::GigDetected)));

    shared.lock().unwrap().seek(std::io::SeekFrom::Start(0)).unwrap();

    let got = dls::read(shared, DlsMode::Gig).unwrap();
    assert_eq!(got.opaque_chunks.len(), 1);
    assert_eq!(got.opaque_chunks[0].0, instpatch::gig::fourcc::THREE_LNK);
}
