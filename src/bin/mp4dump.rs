use clap::{ArgAction, Parser};
use mp4tree::{
    BoxRecord, ByteSource, Config, Decoder, FourCC, Payload, default_registry,
    json_api::to_json_tree,
    metadata,
    registry::{BoxValue, kind_label},
    util::{hex_dump, read_slice},
};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(version, about = "ISOBMFF box tree explorer")]
struct Args {
    /// MP4/ISOBMFF file path
    path: String,

    /// Only print subtree(s) matching a dotted path (e.g. moov.trak[0].mdia.minf.stbl)
    #[arg(long = "filter")]
    filter: Option<String>,

    /// Dump raw payload of this 4CC (e.g. --raw stsd)
    #[arg(long = "raw")]
    raw: Option<String>,

    /// Limit printed depth of the text tree
    #[arg(long)]
    max_depth: Option<usize>,

    /// Print decoded values when a payload decoder exists
    #[arg(long, action = ArgAction::SetTrue)]
    decode: bool,

    /// Show bytes count when dumping raw (0 means entire box payload)
    #[arg(long, default_value_t = 0)]
    bytes: usize,

    /// Emit JSON instead of human-readable tree
    #[arg(long, action = ArgAction::SetTrue)]
    json: bool,

    /// Print metadata-list (ilst) entries instead of the tree
    #[arg(long, action = ArgAction::SetTrue)]
    tags: bool,

    /// JSON config file (default_mode, max_depth, inline_limit)
    #[arg(long)]
    config: Option<String>,

    /// Open mode, overriding the config's default_mode
    #[arg(long)]
    mode: Option<String>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(p) => Config::from_json_file(p)?,
        None => Config::default(),
    };

    let mut src = mp4tree::open(&args.path, args.mode.as_deref(), &config)?;
    let decoder = Decoder::new(default_registry(), config.decode_options());
    let top = decoder.decode_all(&mut src)?;

    let targets: Vec<&BoxRecord> = match &args.filter {
        Some(path) => select_by_path(&top, path),
        None => top.iter().collect(),
    };

    // JSON mode: output JSON and exit (no tree or raw to keep output clean)
    if args.json {
        let owned: Vec<BoxRecord> = targets.into_iter().cloned().collect();
        println!("{}", serde_json::to_string_pretty(&to_json_tree(&owned))?);
        return Ok(());
    }

    if args.tags {
        print_tags(&top);
        return Ok(());
    }

    let max_depth = args.max_depth.unwrap_or(config.max_depth);
    for b in &targets {
        print_box(b, 0, max_depth, args.decode);
    }

    if let Some(sel) = args.raw.as_ref() {
        dump_raw(&mut src, &top, sel, args.bytes)?;
    }

    Ok(())
}

// ---------- Human-readable tree ----------

fn print_box(b: &BoxRecord, depth: usize, max_depth: usize, decode: bool) {
    let indent = "  ".repeat(depth);
    let hdr = &b.hdr;
    let detail = match b.version_flags() {
        Some((version, flags)) => format!(" (ver={}, flags=0x{:06x})", version, flags),
        None if b.is_container() => " (container)".to_string(),
        None => String::new(),
    };
    println!(
        "{indent}{:>6} {:>10} {}{}",
        format!("{:#x}", hdr.start),
        b.size(),
        display_type(b),
        detail
    );
    if decode {
        if let Some(v) = &b.value {
            println!("{indent}        -> {}", describe(v));
        }
    }
    if depth + 1 <= max_depth {
        for c in b.children() {
            print_box(c, depth + 1, max_depth, decode);
        }
    }
}

fn display_type(b: &BoxRecord) -> String {
    match b.hdr.uuid {
        Some(u) => format!("uuid:{}", hex::encode(u)),
        None => format!("{} [{}]", b.typ(), kind_label(b)),
    }
}

fn describe(v: &BoxValue) -> String {
    match v {
        BoxValue::FileType(f) => format!(
            "major={} minor={} compatible={:?}",
            f.major_brand, f.minor_version, f.compatible_brands
        ),
        BoxValue::Handler(h) => format!("handler={} name={:?}", h.handler_type, h.name),
        BoxValue::MovieHeader(m) => {
            format!("timescale={} duration={}", m.timescale, m.duration)
        }
        BoxValue::MediaHeader(m) => format!(
            "timescale={} duration={} language={}",
            m.timescale, m.duration, m.language
        ),
        BoxValue::MetadataKey(k) => format!("key={}", k),
        BoxValue::Data(d) => match (d.as_text(), d.as_integer()) {
            (Some(s), _) => format!("{:?}", s),
            (None, Some(i)) => i.to_string(),
            (None, None) => format!("{:?}, {} bytes", d.kind, d.bytes.len()),
        },
    }
}

// ---------- Raw dump ----------

fn dump_raw<S: ByteSource + ?Sized>(
    src: &mut S,
    boxes: &[BoxRecord],
    sel: &str,
    limit: usize,
) -> anyhow::Result<()> {
    let typ: FourCC = sel.parse()?;
    let mut matches = Vec::new();
    select_boxes(boxes, typ, &mut matches);

    for (i, b) in matches.into_iter().enumerate() {
        // containers dump their whole body, children included
        let (off, len) = match b.payload() {
            Some(Payload::Deferred { offset, len }) => (*offset, *len),
            Some(p) => (b.hdr.end() - p.len(), p.len()),
            None => (b.hdr.payload_start(), b.hdr.size - b.hdr.header_size),
        };
        let to_read = if limit == 0 || limit as u64 > len {
            len
        } else {
            limit as u64
        };
        let data = read_slice(src, off, to_read)?;
        println!(
            "\n== Dump {} ({}) payload: offset={:#x}, len={} ==",
            i,
            display_type(b),
            off,
            to_read
        );
        print!("{}", hex_dump(&data, off));
    }
    Ok(())
}

fn select_boxes<'a>(list: &'a [BoxRecord], typ: FourCC, out: &mut Vec<&'a BoxRecord>) {
    for b in list {
        if b.typ() == typ {
            out.push(b);
        }
        select_boxes(b.children(), typ, out);
    }
}

// ---------- Filter path: moov.trak[0].mdia.minf.stbl ----------

fn select_by_path<'a>(roots: &'a [BoxRecord], path: &str) -> Vec<&'a BoxRecord> {
    let mut current: Vec<&'a BoxRecord> = Vec::new();

    for (depth, seg) in path.split('.').enumerate() {
        let (name, idx) = parse_segment(seg);
        let Ok(fourcc) = name.parse::<FourCC>() else {
            return Vec::new();
        };

        let candidates: Vec<&'a [BoxRecord]> = if depth == 0 {
            vec![roots]
        } else {
            current.iter().map(|&b| b.children()).collect()
        };

        let mut next = Vec::new();
        for list in candidates {
            let mut matches: Vec<&BoxRecord> = list.iter().filter(|b| b.typ() == fourcc).collect();
            match idx {
                Some(i) if i < matches.len() => next.push(matches[i]),
                Some(_) => {}
                None => next.append(&mut matches),
            }
        }

        current = next;
        if current.is_empty() {
            break;
        }
    }

    current
}

fn parse_segment(seg: &str) -> (&str, Option<usize>) {
    if let Some(l) = seg.find('[') {
        let name = &seg[..l];
        if let Some(r) = seg[l + 1..].find(']') {
            let idx = seg[l + 1..l + 1 + r].parse::<usize>().ok();
            return (name, idx);
        }
        (name, None)
    } else {
        (seg, None)
    }
}

// ---------- Metadata list ----------

fn print_tags(boxes: &[BoxRecord]) {
    let mut lists = Vec::new();
    select_boxes(boxes, metadata::ILST, &mut lists);
    for ilst in lists {
        for (key, value) in metadata::entries(ilst) {
            let shown = match (value.as_text(), value.as_integer()) {
                (Some(s), _) => s,
                (None, Some(i)) => i.to_string(),
                (None, None) => format!("<{:?}, {} bytes>", value.kind, value.bytes.len()),
            };
            println!("{:<32} {}", key, shown);
        }
    }
}
