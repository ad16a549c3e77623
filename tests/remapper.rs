use std::io::{self, Write};
use std::sync::Arc;
use std::thread;
use tapisk::{Direction, Error, LocationIndex, MemoryIndex, Remapper, SqliteIndex};
use tape::{FileTape, MemoryTape, SequentialDrive};

const BLOCK_SIZE: u64 = 4096;
const BS: usize = BLOCK_SIZE as usize;

fn init_logger() {
    env_logger::builder().is_test(true).try_init().ok();
}

fn memory_remapper(blocks: u64) -> Remapper<MemoryTape, MemoryIndex> {
    let tape = MemoryTape::new(BLOCK_SIZE);
    Remapper::new(tape, MemoryIndex::new(), blocks * BLOCK_SIZE, BLOCK_SIZE).unwrap()
}

fn block(value: u8) -> Vec<u8> {
    vec![value; BS]
}

/// A file-backed tape holding blocks of 0x00, 0x01 and 0x02, indexed one to one.
fn prepopulated(dir: &tempfile::TempDir) -> Remapper<FileTape, SqliteIndex> {
    let mut file = tempfile::tempfile().unwrap();
    for value in 0..3 {
        file.write_all(&block(value)).unwrap();
    }

    let mut index = SqliteIndex::open(dir.path().join("index.db"), "test").unwrap();
    for i in 0..3 {
        index.set_location(i, i).unwrap();
    }

    Remapper::new(FileTape::from_file(file, BLOCK_SIZE), index, 3 * BLOCK_SIZE, BLOCK_SIZE).unwrap()
}

#[test]
fn overwrite_inside_a_block() {
    init_logger();
    let remapper = memory_remapper(4);

    assert_eq!(remapper.write_at(b"Hello, world!", 0).unwrap(), 13);
    assert_eq!(remapper.write_at(b"ovrw", 2).unwrap(), 4);

    let mut head = [0u8; 2];
    assert_eq!(remapper.read_at(&mut head, 0).unwrap(), 2);
    assert_eq!(&head, b"He");

    let mut tail = [0u8; 7];
    assert_eq!(remapper.read_at(&mut tail, 6).unwrap(), 7);
    assert_eq!(&tail, b" world!");

    let mut whole = [0u8; 13];
    remapper.read_at(&mut whole, 0).unwrap();
    assert_eq!(&whole, b"Heovrw world!");
}

#[test]
fn read_table_over_prepopulated_tape() {
    init_logger();
    let dir = tempfile::tempdir().unwrap();
    let remapper = prepopulated(&dir);
    let half = BS / 2;

    let concat = |parts: &[(u8, usize)]| -> Vec<u8> {
        parts.iter().flat_map(|&(value, len)| std::iter::repeat(value).take(len)).collect()
    };

    let cases: Vec<(&str, u64, Vec<u8>)> = vec![
        ("whole tape", 0, concat(&[(0, BS), (1, BS), (2, BS)])),
        ("first block", 0, block(0)),
        ("middle block", BLOCK_SIZE, block(1)),
        ("last block", 2 * BLOCK_SIZE, block(2)),
        ("first half of the first block", 0, concat(&[(0, half)])),
        ("second half of the first block", half as u64, concat(&[(0, half)])),
        ("straddling two blocks", half as u64, concat(&[(0, half), (1, half)])),
        (
            "straddling two blocks plus some bytes",
            half as u64,
            concat(&[(0, half), (1, half + 12)]),
        ),
    ];

    for (name, offset, want) in cases {
        let mut got = vec![0xffu8; want.len()];
        let n = remapper.read_at(&mut got, offset).unwrap();
        assert_eq!(n, want.len(), "{name}");
        assert!(got == want, "{name}: read back different bytes");
    }
}

#[test]
fn partial_write_over_prepopulated_tape() {
    init_logger();
    let dir = tempfile::tempdir().unwrap();
    let remapper = prepopulated(&dir);

    remapper.write_at(b"Overwrite", 2 * BLOCK_SIZE + 2).unwrap();

    let mut got = [0u8; 9];
    remapper.read_at(&mut got, 2 * BLOCK_SIZE + 2).unwrap();
    assert_eq!(&got, b"Overwrite");

    let mut prefix = [0u8; 2];
    remapper.read_at(&mut prefix, 2 * BLOCK_SIZE).unwrap();
    assert_eq!(prefix, [2, 2]);

    let mut rest = vec![0u8; BS - 11];
    remapper.read_at(&mut rest, 2 * BLOCK_SIZE + 11).unwrap();
    assert!(rest.iter().all(|&b| b == 2));

    let (_, index) = remapper.into_parts();
    assert_eq!(index.get_location(2).unwrap(), 3);
    assert_eq!(index.get_location(1).unwrap(), 1);
}

#[test]
fn aligned_round_trip() {
    let remapper = memory_remapper(8);
    let data: Vec<u8> = (0..3 * BS).map(|i| (i % 251) as u8).collect();

    assert_eq!(remapper.write_at(&data, 2 * BLOCK_SIZE).unwrap(), data.len());

    let mut buf = vec![0u8; data.len()];
    assert_eq!(remapper.read_at(&mut buf, 2 * BLOCK_SIZE).unwrap(), buf.len());
    assert_eq!(buf, data);

    // No read-modify-write for whole blocks: exactly three blocks reached the tape.
    let (tape, _) = remapper.into_parts();
    assert_eq!(tape.blocks().len(), 3);
}

#[test]
fn partial_write_preserves_surrounding_bytes() {
    let remapper = memory_remapper(4);
    remapper.write_at(&block(7), 0).unwrap();
    remapper.write_at(&[9u8; 100], 1000).unwrap();

    let mut buf = block(0);
    remapper.read_at(&mut buf, 0).unwrap();
    assert!(buf[..1000].iter().all(|&b| b == 7));
    assert!(buf[1000..1100].iter().all(|&b| b == 9));
    assert!(buf[1100..].iter().all(|&b| b == 7));
}

#[test]
fn never_written_blocks_read_as_zeroes() {
    let remapper = memory_remapper(4);
    remapper.write_at(&block(5), BLOCK_SIZE).unwrap();

    let mut buf = vec![0xaau8; 3 * BS];
    remapper.read_at(&mut buf, 0).unwrap();
    assert!(buf[..BS].iter().all(|&b| b == 0));
    assert!(buf[BS..2 * BS].iter().all(|&b| b == 5));
    assert!(buf[2 * BS..].iter().all(|&b| b == 0));
}

#[test]
fn writes_always_append() {
    let remapper = memory_remapper(8);

    remapper.write_at(&block(1), 5 * BLOCK_SIZE).unwrap();
    remapper.write_at(&block(2), 2 * BLOCK_SIZE).unwrap();
    remapper.write_at(&block(3), 5 * BLOCK_SIZE).unwrap();

    let (tape, index) = remapper.into_parts();
    assert_eq!(tape.blocks(), &[block(1), block(2), block(3)]);
    assert_eq!(index.get_location(5).unwrap(), 2);
    assert_eq!(index.get_location(2).unwrap(), 1);
    assert!(matches!(index.get_location(0), Err(Error::NotExists)));
}

#[test]
fn write_after_read_seeks_to_end_of_data() {
    let remapper = memory_remapper(8);
    remapper.write_at(&[block(0), block(1), block(2)].concat(), 0).unwrap();

    // Leaves the head right behind tape block 0.
    let mut buf = block(0xff);
    remapper.read_at(&mut buf, 0).unwrap();
    assert_eq!(remapper.direction(), Direction::Read);

    remapper.write_at(&block(3), 3 * BLOCK_SIZE).unwrap();

    let mut all = vec![0u8; 4 * BS];
    remapper.read_at(&mut all, 0).unwrap();
    assert_eq!(all, [block(0), block(1), block(2), block(3)].concat());

    let (tape, _) = remapper.into_parts();
    assert_eq!(tape.blocks().len(), 4);
}

#[test]
fn concurrent_writers() {
    let remapper = Arc::new(memory_remapper(16));

    let workers: Vec<_> = (0..4u8)
        .map(|worker| {
            let remapper = remapper.clone();
            thread::spawn(move || {
                for i in 0..4u64 {
                    let logical = worker as u64 * 4 + i;
                    remapper.write_at(&block(logical as u8), logical * BLOCK_SIZE).unwrap();
                    let mut buf = block(0xff);
                    remapper.read_at(&mut buf, logical * BLOCK_SIZE).unwrap();
                    assert_eq!(buf, block(logical as u8));
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    for logical in 0..16u64 {
        let mut buf = block(0xff);
        remapper.read_at(&mut buf, logical * BLOCK_SIZE).unwrap();
        assert_eq!(buf, block(logical as u8));
    }
}

/// Fails every block write once armed.
struct FailingTape {
    inner: MemoryTape,
    fail_writes: bool,
}

impl SequentialDrive for FailingTape {
    fn native_block_size(&self) -> io::Result<u64> {
        self.inner.native_block_size()
    }

    fn seek_to_block(&mut self, block: u64) -> io::Result<()> {
        self.inner.seek_to_block(block)
    }

    fn seek_to_end_of_data(&mut self) -> io::Result<()> {
        self.inner.seek_to_end_of_data()
    }

    fn tell(&mut self) -> io::Result<u64> {
        self.inner.tell()
    }

    fn read_block(&mut self, buf: &mut [u8]) -> io::Result<()> {
        self.inner.read_block(buf)
    }

    fn write_block(&mut self, buf: &[u8]) -> io::Result<()> {
        if self.fail_writes {
            return Err(io::Error::new(io::ErrorKind::Other, "write error"));
        }
        self.inner.write_block(buf)
    }
}

#[test]
fn failed_write_leaves_index_ahead_of_tape() {
    let tape = FailingTape {
        inner: MemoryTape::new(BLOCK_SIZE),
        fail_writes: false,
    };
    let remapper = Remapper::new(tape, MemoryIndex::new(), 4 * BLOCK_SIZE, BLOCK_SIZE).unwrap();
    remapper.write_at(&block(1), 0).unwrap();

    let (mut tape, index) = remapper.into_parts();
    tape.fail_writes = true;
    let remapper = Remapper::new(tape, index, 4 * BLOCK_SIZE, BLOCK_SIZE).unwrap();

    let err = remapper.write_at(&block(2), BLOCK_SIZE).unwrap_err();
    assert!(matches!(err, Error::Hardware(_)));

    // The index was updated before the write failed.
    let mut buf = block(0);
    assert!(matches!(remapper.read_at(&mut buf, BLOCK_SIZE), Err(Error::Hardware(_))));

    let (tape, index) = remapper.into_parts();
    assert_eq!(index.get_location(1).unwrap(), 1);
    assert_eq!(tape.inner.blocks().len(), 1);
}

/// Index whose backing store is damaged.
struct CorruptIndex {
    fail_updates: bool,
}

impl LocationIndex for CorruptIndex {
    fn set_location(&mut self, block: u64, _location: u64) -> tapisk::Result<()> {
        if self.fail_updates {
            return Err(Error::CorruptEntry(block));
        }
        Ok(())
    }

    fn get_location(&self, block: u64) -> tapisk::Result<u64> {
        Err(Error::CorruptEntry(block))
    }
}

#[test]
fn index_errors_abort_reads_and_partial_writes() {
    let index = CorruptIndex { fail_updates: false };
    let tape = MemoryTape::new(BLOCK_SIZE);
    let remapper = Remapper::new(tape, index, 4 * BLOCK_SIZE, BLOCK_SIZE).unwrap();

    let mut buf = [0u8; 16];
    let err = remapper.read_at(&mut buf, BLOCK_SIZE + 4).unwrap_err();
    assert!(matches!(err, Error::CorruptEntry(1)));
    assert!(err.is_storage());

    let err = remapper.write_at(b"partial", 2 * BLOCK_SIZE + 1).unwrap_err();
    assert!(matches!(err, Error::CorruptEntry(2)));

    let (tape, _) = remapper.into_parts();
    assert!(tape.blocks().is_empty());
}

#[test]
fn index_update_failure_aborts_write_before_tape() {
    let index = CorruptIndex { fail_updates: true };
    let tape = MemoryTape::new(BLOCK_SIZE);
    let remapper = Remapper::new(tape, index, 4 * BLOCK_SIZE, BLOCK_SIZE).unwrap();

    let err = remapper.write_at(&[block(1), block(2)].concat(), BLOCK_SIZE).unwrap_err();
    assert!(matches!(err, Error::CorruptEntry(1)));

    let (tape, _) = remapper.into_parts();
    assert!(tape.blocks().is_empty());
}
