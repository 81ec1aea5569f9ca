use candle_core::{Device, Tensor};
use criterion::{Criterion, black_box, criterion_group, criterion_main};
use kusari_core::crf::{LinearChainCrf, Reduction};

const NUM_TAGS: usize = 9;
const BATCH: usize = 16;
const SEQ: usize = 64;

fn pseudo_values(n: usize, seed: u32) -> Vec<f32> {
    let mut state = seed;
    (0..n)
        .map(|_| {
            state = state.wrapping_mul(1664525).wrapping_add(1013904223);
            (state >> 16) as f32 / 65536.0 - 0.5
        })
        .collect()
}

fn fixture() -> (LinearChainCrf, Tensor, Tensor, Tensor) {
    let dev = Device::Cpu;
    let start = Tensor::from_vec(pseudo_values(NUM_TAGS, 1), NUM_TAGS, &dev).unwrap();
    let end = Tensor::from_vec(pseudo_values(NUM_TAGS, 2), NUM_TAGS, &dev).unwrap();
    let trans = Tensor::from_vec(
        pseudo_values(NUM_TAGS * NUM_TAGS, 3),
        (NUM_TAGS, NUM_TAGS),
        &dev,
    )
    .unwrap();
    let crf = LinearChainCrf::from_tensors(start, end, trans).unwrap();

    let emissions = Tensor::from_vec(
        pseudo_values(BATCH * SEQ * NUM_TAGS, 4),
        (BATCH, SEQ, NUM_TAGS),
        &dev,
    )
    .unwrap();

    // Staggered real lengths, tail padding only.
    let mut mask = vec![0_u8; BATCH * SEQ];
    for row in 0..BATCH {
        let len = SEQ - row * 3;
        for t in 0..len {
            mask[row * SEQ + t] = 1;
        }
    }
    let mask = Tensor::from_vec(mask, (BATCH, SEQ), &dev).unwrap();

    let tags = Tensor::from_vec(
        (0..BATCH * SEQ).map(|i| (i % NUM_TAGS) as u32).collect(),
        (BATCH, SEQ),
        &dev,
    )
    .unwrap();

    (crf, emissions, mask, tags)
}

fn bench_crf(c: &mut Criterion) {
    let (crf, emissions, mask, tags) = fixture();

    c.bench_function("viterbi_decode_16x64", |b| {
        b.iter(|| crf.decode(black_box(&emissions), black_box(&mask)).unwrap());
    });

    c.bench_function("log_likelihood_16x64", |b| {
        b.iter(|| {
            crf.log_likelihood(
                black_box(&emissions),
                black_box(&tags),
                black_box(&mask),
                Reduction::Mean,
            )
            .unwrap()
        });
    });
}

criterion_group!(benches, bench_crf);
criterion_main!(benches);
