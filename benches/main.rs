use criterion::criterion_group;
use criterion::criterion_main;
use criterion::BatchSize;
use criterion::Criterion;

use metaspace::metaspace::chunklevel::MAX_CHUNK_BYTE_SIZE;
use metaspace::{MetadataType, MetaspaceBuilder, MetaspaceType};

pub fn bench_main(c: &mut Criterion) {
    let mut builder = MetaspaceBuilder::new_no_env_vars();
    builder.set_option(
        "compressed_class_space_size",
        &(64 * MAX_CHUNK_BYTE_SIZE).to_string(),
    );
    let ms = builder.build().unwrap();

    // A loader that loads a few hundred small classes, then goes away.
    c.bench_function("load_and_unload", |b| {
        b.iter(|| {
            let loader = ms.new_class_loader_metaspace(MetaspaceType::Standard);
            for i in 0..300 {
                loader
                    .expand_and_allocate(60 + i % 8, MetadataType::Class)
                    .unwrap();
                loader
                    .expand_and_allocate(20 + i % 50, MetadataType::NonClass)
                    .unwrap();
            }
        })
    });

    // Allocation served from freed blocks.
    c.bench_function("reuse_freed", |b| {
        b.iter_batched(
            || {
                let loader = ms.new_class_loader_metaspace(MetaspaceType::Standard);
                let blocks: Vec<_> = (0..100)
                    .map(|i| (loader.allocate(10 + i, MetadataType::NonClass).unwrap(), 10 + i))
                    .collect();
                for &(addr, words) in blocks.iter() {
                    loader.deallocate(addr, words, MetadataType::NonClass);
                }
                loader
            },
            |loader| {
                for i in 0..100 {
                    loader.allocate(10 + i, MetadataType::NonClass).unwrap();
                }
                loader
            },
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(benches, bench_main);
criterion_main!(benches);
