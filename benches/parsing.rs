use criterion::{criterion_group, criterion_main, Criterion};
use std::io::Write;
use std::path::Path;

/// Build a mailbox with `count` alternating plain and multipart messages.
fn synthetic_mbox(count: usize) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    for i in 0..count {
        let day = i % 28 + 1;
        write!(
            file,
            "From shop{i}@example.com Sat Jan {day:02} 03:04:05 2021\n\
             From: Shop {i} <orders@shop{i}.example>\n\
             Date: Sat, {day:02} Jan 2021 03:04:{:02} +0000\n\
             Subject: Order {i}\n",
            i % 60
        )
        .unwrap();
        if i % 2 == 0 {
            writeln!(file, "\nThanks for order {i}.\nTotal: {i}.00 EUR\n").unwrap();
        } else {
            writeln!(
                file,
                "MIME-Version: 1.0\n\
                 Content-Type: multipart/alternative; boundary=\"b{i}\"\n\n\
                 --b{i}\nContent-Type: text/plain\n\nTotal: {i}.00 EUR\n\
                 --b{i}\nContent-Type: text/html\n\n<p>Total: {i}.00 EUR</p>\n\
                 --b{i}--\n"
            )
            .unwrap();
        }
    }
    file.flush().unwrap();
    file
}

fn bench_load_mailbox(c: &mut Criterion) {
    let fixture_path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join("receipts.mbox");

    c.bench_function("load_fixture_mailbox", |b| {
        b.iter(|| mboxsync::mailbox::load(&fixture_path).unwrap().len())
    });

    let synthetic = synthetic_mbox(1_000);
    c.bench_function("load_synthetic_1000", |b| {
        b.iter(|| mboxsync::mailbox::load(synthetic.path()).unwrap().len())
    });
}

fn bench_flatten_bodies(c: &mut Criterion) {
    let synthetic = synthetic_mbox(200);
    let mailbox = mboxsync::mailbox::load(synthetic.path()).unwrap();

    c.bench_function("flatten_bodies_200", |b| {
        b.iter(|| {
            let mut parts = 0usize;
            for message in &mailbox.messages {
                let body = mboxsync::parser::mime::parse_body(&message.raw).unwrap();
                parts += mboxsync::parser::mime::flatten(&body).len();
            }
            parts
        })
    });
}

criterion_group!(benches, bench_load_mailbox, bench_flatten_bodies);
criterion_main!(benches);
