use bencher::Fixture;
use criterion::{BatchSize, BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use micro_duplex::codec::RequestDecoder;
use std::hint::black_box;
use tokio_util::bytes::BytesMut;
use tokio_util::codec::Decoder;

static FIXTURES: [Fixture; 3] = [
    Fixture::small("small_header", include_str!("../resources/request/get_small.txt")),
    Fixture::normal("large_header", include_str!("../resources/request/get_large.txt")),
    Fixture::normal("chunked_body", include_str!("../resources/request/post_chunked.txt")),
];

fn benchmark_request_decoder(criterion: &mut Criterion) {
    let mut group = criterion.benchmark_group("request_decoder");

    for fixture in &FIXTURES {
        group.throughput(Throughput::Bytes(fixture.len()));
        group.bench_with_input(BenchmarkId::from_parameter(fixture.name()), fixture, |b, fixture| {
            let mut request_decoder = RequestDecoder::default();
            b.iter_batched_ref(
                || BytesMut::from(fixture.content()),
                |bytes_mut| {
                    // a head, then payload items up to the terminal one
                    while let Some(message) = request_decoder.decode(bytes_mut).expect("input should be a valid http request") {
                        black_box(message);
                    }
                },
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

criterion_group!(decoder, benchmark_request_decoder);
criterion_main!(decoder);
