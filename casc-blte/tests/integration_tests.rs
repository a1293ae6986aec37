//! End-to-end tests over hand-built and file-backed BLTE records

use std::io::{Read, Seek, SeekFrom, Write};
use std::sync::{Arc, Mutex};

use casc_blte::{
    BLTE_MAGIC, BlockSource, BlteBuffer, BlteStream, EncodingMode, TABLE_MARKER, build_record,
    encode_chunk,
};
use pretty_assertions::assert_eq;

/// zlib stream of the ASCII bytes `test`.
const ZLIB_TEST: [u8; 12] = [
    0x78, 0xDA, 0x2B, 0x49, 0x2D, 0x2E, 0x01, 0x00, 0x04, 0x5D, 0x01, 0xC1,
];

fn frame_with_chunks(chunks: &[(Vec<u8>, u32)]) -> Vec<u8> {
    let header_size = 8 + 4 + 24 * chunks.len() as u32;

    let mut data = Vec::new();
    data.extend_from_slice(&BLTE_MAGIC);
    data.extend_from_slice(&header_size.to_be_bytes());
    data.push(TABLE_MARKER);
    data.extend_from_slice(&(chunks.len() as u32).to_be_bytes()[1..4]);

    for (chunk, decoded_size) in chunks {
        data.extend_from_slice(&(chunk.len() as u32).to_be_bytes());
        data.extend_from_slice(&decoded_size.to_be_bytes());
        data.extend_from_slice(&md5::compute(chunk).0);
    }
    for (chunk, _) in chunks {
        data.extend_from_slice(chunk);
    }

    data
}

#[test]
fn zlib_chunk_decodes_and_caches() {
    let mut chunk = vec![b'Z'];
    chunk.extend_from_slice(&ZLIB_TEST);

    let frame = frame_with_chunks(&[(chunk, 4), (b"Nrest".to_vec(), 4)]);
    let mut buffer = BlteBuffer::open_frame(&BlockSource::memory(frame)).unwrap();

    let mut first = [0u8; 8];
    assert_eq!(buffer.read_at(0, &mut first).unwrap(), 8);
    assert_eq!(&first, b"testrest");

    // Second read of the same range comes from the handler cache and must
    // be byte-identical.
    let mut second = [0u8; 8];
    assert_eq!(buffer.read_at(0, &mut second).unwrap(), 8);
    assert_eq!(first, second);
}

#[test]
fn encrypted_chunk_surfaces_on_read_not_open() {
    let mut encrypted = vec![b'E'];
    encrypted.extend_from_slice(&[0u8; 24]);

    let frame = frame_with_chunks(&[
        (encode_chunk(b"clear", EncodingMode::None).unwrap(), 5),
        (encrypted, 16),
    ]);

    let mut buffer = BlteBuffer::open_frame(&BlockSource::memory(frame)).unwrap();

    // The plain prefix is readable...
    let mut head = [0u8; 5];
    assert_eq!(buffer.read_at(0, &mut head).unwrap(), 5);
    assert_eq!(&head, b"clear");

    // ...but touching the encrypted chunk fails.
    let mut tail = [0u8; 1];
    assert!(matches!(
        buffer.read_at(5, &mut tail),
        Err(casc_blte::Error::UnsupportedMode(0x45))
    ));
}

#[test]
fn file_backed_record_stream() {
    // A record embedded mid-file, the way data.NNN files store them.
    let record = build_record(&vec![0xA5u8; 10_000], 4096, EncodingMode::ZLib).unwrap();

    let mut file = tempfile::tempfile().unwrap();
    file.write_all(b"leading junk").unwrap();
    let offset = file.stream_position().unwrap();
    file.write_all(&record).unwrap();
    file.write_all(b"trailing junk").unwrap();

    let key = md5::compute(&record).0;
    let mut stream =
        BlteStream::open_record_in_file(file, offset, record.len() as u64, Some(&key[..9]))
            .unwrap();

    assert_eq!(stream.len(), 10_000);

    stream.seek(SeekFrom::Start(9_000)).unwrap();
    let mut out = Vec::new();
    stream.read_to_end(&mut out).unwrap();
    assert_eq!(out.len(), 1_000);
    assert!(out.iter().all(|&b| b == 0xA5));

    // Backward seek into an already-decoded region.
    stream.seek(SeekFrom::Start(0)).unwrap();
    let mut head = [0u8; 16];
    stream.read_exact(&mut head).unwrap();
    assert!(head.iter().all(|&b| b == 0xA5));
}

#[test]
fn streams_outlive_their_source_scope() {
    let record = build_record(b"independent handle", 8, EncodingMode::None).unwrap();

    let stream = {
        let handle = Arc::new(Mutex::new(tempfile::tempfile().unwrap()));
        handle
            .lock()
            .unwrap()
            .write_all(&record)
            .unwrap();

        let source = BlockSource::file(handle, 0, record.len() as u64);
        BlteStream::new(BlteBuffer::open_record(&source).unwrap())
    };

    let mut stream = stream;
    let mut out = Vec::new();
    stream.read_to_end(&mut out).unwrap();
    assert_eq!(out, b"independent handle");
}
