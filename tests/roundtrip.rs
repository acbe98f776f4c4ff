//! End-to-end scenarios across the format stack

use nitrokit::compression::{code, lz10};
use nitrokit::formats::bmg::{Bmg, Message};
use nitrokit::formats::fnt::Folder;
use nitrokit::rom::{NdsRom, SaveOptions};
use nitrokit::sound::sdat::Sdat;
use nitrokit::sound::sequence::{read_events, SequenceEvent};
use nitrokit::sound::sseq::Sseq;
use nitrokit::utils::crc16;

#[test]
fn lz10_reference_bytes() {
    let plain = b"This is some data to compress";
    let compressed = lz10::compress(plain);
    let expected: Vec<u8> = vec![
        0x10, 0x1d, 0x00, 0x00, 0x04, 0x54, 0x68, 0x69, 0x73, 0x20, 0x00, 0x02, 0x73, 0x6f, 0x00,
        0x6d, 0x65, 0x20, 0x64, 0x61, 0x74, 0x61, 0x20, 0x00, 0x74, 0x6f, 0x20, 0x63, 0x6f, 0x6d,
        0x70, 0x72, 0x00, 0x65, 0x73, 0x73, 0x00, 0x00, 0x00, 0x00, 0x00,
    ];
    assert_eq!(compressed, expected);
    assert_eq!(lz10::decompress(&compressed).unwrap(), plain);
}

#[test]
fn code_compression_round_trips_both_modes() {
    let blob: Vec<u8> = (0..0x5000u32)
        .map(|i| match i % 32 {
            0..=15 => (i / 256) as u8,
            _ => (i % 9) as u8,
        })
        .collect();

    for arm9 in [false, true] {
        let compressed = code::compress(&blob, arm9);
        assert_eq!(code::decompress(&compressed).unwrap(), blob, "arm9={arm9}");
    }
}

#[test]
fn bmg_reference_header() {
    let bmg = Bmg::from_messages(vec![
        Message::text("Open your eyes..."),
        Message::text("Wake up, Link..."),
    ]);
    let data = bmg.save().unwrap();

    assert_eq!(
        &data[..8],
        &[0x4D, 0x45, 0x53, 0x47, 0x62, 0x6D, 0x67, 0x31]
    );
    assert_eq!(&data[8..12], &[0xA0, 0x00, 0x00, 0x00]);
    assert_eq!(&data[12..16], &[0x02, 0x00, 0x00, 0x00]);

    let reparsed = Bmg::from_bytes(&data).unwrap();
    assert_eq!(reparsed.messages, bmg.messages);
}

#[test]
fn rom_header_bytes_and_crc() {
    let mut rom = NdsRom::new();
    rom.title = b"NEW MARIO".to_vec();
    rom.id_code = *b"A2DE";
    rom.files = vec![vec![0u8; 0x40]];
    rom.filenames = Folder {
        folders: vec![],
        files: vec!["file.bin".into()],
        first_id: 0,
    };

    let data = rom.save(SaveOptions::default()).unwrap();
    assert_eq!(
        &data[..16],
        &[
            0x4E, 0x45, 0x57, 0x20, 0x4D, 0x41, 0x52, 0x49, 0x4F, 0x00, 0x00, 0x00, 0x41, 0x32,
            0x44, 0x45
        ]
    );

    let stored = u16::from_le_bytes([data[0x15C], data[0x15D]]);
    assert_ne!(stored, 0); // logo CRC
    let header_crc = u16::from_le_bytes([data[0x15E], data[0x15F]]);
    assert_eq!(header_crc, crc16(&data[..0x15E]));
}

#[test]
fn rom_filesystem_survives_round_trip() {
    let mut rom = NdsRom::new();
    rom.title = b"TESTBED".to_vec();
    rom.files = vec![b"alpha".to_vec(), b"beta".to_vec(), b"gamma".to_vec()];
    rom.filenames = Folder {
        folders: vec![(
            "sub".into(),
            Folder {
                folders: vec![],
                files: vec!["b.bin".into(), "c.bin".into()],
                first_id: 1,
            },
        )],
        files: vec!["a.bin".into()],
        first_id: 0,
    };

    let data = rom.save(SaveOptions::default()).unwrap();
    let loaded = NdsRom::from_bytes(&data).unwrap();

    assert_eq!(loaded.file_by_name("a.bin").unwrap(), b"alpha");
    assert_eq!(loaded.file_by_name("sub/b.bin").unwrap(), b"beta");
    assert_eq!(loaded.file_by_name("sub/c.bin").unwrap(), b"gamma");

    // Lookup consistency both ways.
    for id in 0..3u16 {
        let name = loaded.filenames.name_of(id).unwrap();
        assert_eq!(loaded.filenames.id_of(&name), Some(id));
    }
}

#[test]
fn sseq_scenario_resolves_targets() {
    // Track 0: DefineTracks {0,1}, BeginTrack 1 -> @16, Jump -> @0.
    // At @16: two notes then EndTrack. Bytes 12..16 are unreachable.
    let mut data = Vec::new();
    data.extend_from_slice(&[0xFE, 0x03, 0x00]); // @0  DefineTracks
    data.extend_from_slice(&[0x93, 0x01, 16, 0, 0]); // @3  BeginTrack 1 -> 16
    data.extend_from_slice(&[0x94, 0x00, 0x00, 0x00]); // @8  Jump -> 0
    data.extend_from_slice(&[0x00; 4]); // @12 unreachable
    data.extend_from_slice(&[0x3C, 0x64, 0x30]); // @16 note
    data.extend_from_slice(&[0x3E, 0x64, 0x30]); // @19 note
    data.push(0xFF); // @22 EndTrack

    let (events, _) = read_events(&data, &[]).unwrap();

    let begin_track_target = events
        .iter()
        .find_map(|e| match e {
            SequenceEvent::BeginTrack { first_event, .. } => Some(*first_event),
            _ => None,
        })
        .expect("BeginTrack present");
    assert!(matches!(
        events[begin_track_target],
        SequenceEvent::Note { pitch: 0x3C, .. }
    ));

    let jump_target = events
        .iter()
        .find_map(|e| match e {
            SequenceEvent::Jump { destination } => Some(*destination),
            _ => None,
        })
        .expect("Jump present");
    assert!(matches!(
        events[jump_target],
        SequenceEvent::DefineTracks { .. }
    ));
}

#[test]
fn sdat_merges_identical_sequences() {
    let make_sseq = || {
        Sseq::from_events(vec![
            SequenceEvent::Note {
                pitch: 60,
                velocity: 100,
                unknown_flag: false,
                duration: 48,
            },
            SequenceEvent::EndTrack,
        ])
    };

    let mut sdat = Sdat::new();
    sdat.sequences = vec![
        (Some("SEQ_A".into()), Some(make_sseq())),
        (Some("SEQ_B".into()), Some(make_sseq())),
    ];

    let data = sdat.save().unwrap();

    // One FAT slot, referenced by both INFO records.
    let fat_offset = u32::from_le_bytes(data[0x20..0x24].try_into().unwrap()) as usize;
    let fat_count = u32::from_le_bytes(data[fat_offset + 8..fat_offset + 12].try_into().unwrap());
    assert_eq!(fat_count, 1);

    let reloaded = Sdat::from_bytes(&data).unwrap();
    assert_eq!(reloaded.sequences.len(), 2);
    assert_eq!(reloaded.sequences[0].0.as_deref(), Some("SEQ_A"));
    let a = reloaded.sequences[0].1.as_ref().unwrap();
    let b = reloaded.sequences[1].1.as_ref().unwrap();
    assert_eq!(a.data_merge_optimization_id, b.data_merge_optimization_id);
}

#[test]
fn sdat_files_round_trip_through_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sound_data.sdat");

    let mut sdat = Sdat::new();
    sdat.sequences = vec![(
        Some("BGM".into()),
        Some(Sseq::from_events(vec![
            SequenceEvent::Rest { duration: 100 },
            SequenceEvent::EndTrack,
        ])),
    )];
    sdat.save_to_file(&path).unwrap();

    let reloaded = Sdat::from_file(&path).unwrap();
    let mut sseq = reloaded.sequences[0].1.clone().unwrap();
    sseq.parse().unwrap();
    assert_eq!(
        sseq.events().unwrap().as_slice(),
        &[
            SequenceEvent::Rest { duration: 100 },
            SequenceEvent::EndTrack
        ]
    );
}
