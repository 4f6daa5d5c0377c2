// SPDX-License-Identifier: MIT

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use koinon_bridge_print::zpl;

fn label_of(fields: usize) -> String {
    let mut content = String::from("^XA^CF0,30");
    for i in 0..fields {
        content.push_str(&format!("^FO40,{}^FDfield {i}^FS", 40 + i * 36));
    }
    content.push_str("^XZ");
    content
}

fn bench_validate(c: &mut Criterion) {
    let small = label_of(4);
    let large = label_of(1200);

    let mut group = c.benchmark_group("zpl_validate");
    group.bench_function("small_label", |b| {
        b.iter(|| zpl::validate(black_box(&small)))
    });
    group.bench_function("large_label", |b| {
        b.iter(|| zpl::validate(black_box(&large)))
    });
    group.finish();
}

criterion_group!(benches, bench_validate);
criterion_main!(benches);
