use olecf::{CompoundFile, Entity, WarningCollector};

fn dump(entity: &Entity, depth: usize) {
    let marker = if entity.is_dir() { "+" } else { "-" };
    println!(
        "{}{} {:?} ({} bytes)",
        "  ".repeat(depth),
        marker,
        entity.name(),
        entity.size()
    );
    for child in entity {
        dump(child, depth + 1);
    }
}

fn main() {
    let file = std::env::args()
        .nth(1)
        .expect("usage: olecf_dump <compound-file>");
    let warnings = WarningCollector::new();
    let doc = CompoundFile::from_file_blocking_with_sink(&file, warnings.clone())
        .expect("unable to parse compound file");

    println!("{file}: {:?}, v{}", doc.container_type(), doc.version());
    println!(
        "sector size {} / mini sector size {}",
        doc.sector_size(),
        doc.mini_sector_size()
    );
    dump(doc.root(), 0);

    for warning in warnings.drain() {
        match warning.dir_index {
            Some(index) => eprintln!(
                "warning [{:?}] entry {}: {}",
                warning.category, index, warning.message
            ),
            None => eprintln!("warning [{:?}]: {}", warning.category, warning.message),
        }
    }
}
