use criterion::{Criterion, criterion_group, criterion_main};
use sdn_core::{Address, Session, TypeTag};
use sdn_nfs::{DirCodec, Directory, DirectoryEntry, FileContent, FileRef, Metadata};

fn directory_with(entries: usize) -> Directory {
    Directory::from_entries((0..entries).map(|i| {
        DirectoryEntry::file(
            format!("file_{i:05}.bin"),
            FileRef {
                size: 16,
                content: FileContent::Inline(vec![i as u8; 16]),
            },
            Metadata::new(1_700_000_000_000).with_attr("mime", "application/octet-stream"),
        )
    }))
    .unwrap()
}

fn bench_dir_codec(c: &mut Criterion) {
    let session = Session::from_seed(b"bench");
    let address = Address::derive(TypeTag::Versioned, &[0; 32]);
    let codec = DirCodec::new(&session, &address);
    let dir = directory_with(500);
    let encoded = codec.encode(&dir).unwrap();

    c.bench_function("dir_encode_500_entries", |b| {
        b.iter(|| codec.encode(&dir).unwrap());
    });

    c.bench_function("dir_decode_500_entries", |b| {
        b.iter(|| codec.decode(&encoded).unwrap());
    });
}

criterion_group!(codec, bench_dir_codec);
criterion_main!(codec);
