//! Subcommand implementations.

use std::error::Error;
use std::io::{self, Write};

use quire_config::Config;
use quire_fs::encoding::{self, Encoding};
use quire_fs::{
    CompressionType, Document, DocumentInputStream, DocumentLoader, DocumentSaver, LoadedDocument,
    LoaderConfig, LocalFile, SaveFlags, SaverConfig,
};

use crate::cli::{CatArgs, ConvertArgs};

pub type CommandResult = Result<(), Box<dyn Error>>;

/// Loader settings from the configuration file.
pub fn loader_config(config: &Config) -> LoaderConfig {
    LoaderConfig {
        candidates: encoding::resolve_candidates(&config.encodings.auto_detected),
        ensure_trailing_newline: config.editor.ensure_trailing_newline,
        chunk_size: config.editor.chunk_size,
        max_size: None,
    }
}

/// Resolve a charset given on the command line.
fn find_encoding(name: &str) -> Result<&'static Encoding, String> {
    encoding::lookup(name)
        .or_else(|| encoding::lookup(&name.to_ascii_uppercase()))
        .ok_or_else(|| format!("unknown charset '{}' (see `quire encodings`)", name))
}

async fn load(config: &Config, path: &std::path::Path, charset: Option<&str>) -> Result<(Document, LoadedDocument), Box<dyn Error>> {
    let mut loader = DocumentLoader::new(LocalFile::new(path), loader_config(config));
    if let Some(charset) = charset {
        loader = loader.with_encoding(find_encoding(charset)?);
    }

    let mut doc = Document::new();
    let loaded = loader.load(&mut doc).await?;
    if let Some(warning) = loaded.warning() {
        eprintln!("warning: {}: {}", path.display(), warning);
    }
    Ok((doc, loaded))
}

pub async fn cat(config: &Config, args: &CatArgs) -> CommandResult {
    let (doc, loaded) = load(config, &args.path, args.encoding.as_deref()).await?;

    let mut rendered = DocumentInputStream::new(&doc, loaded.newline, config.editor.ensure_trailing_newline);
    let mut stdout = io::stdout().lock();
    io::copy(&mut rendered, &mut stdout)?;
    stdout.flush()?;

    eprintln!(
        "{}: {}, {} newlines, compression {}, {} bytes",
        args.path.display(),
        loaded.encoding,
        loaded.newline,
        loaded.compression,
        loaded.bytes_read
    );
    Ok(())
}

pub async fn convert(config: &Config, args: &ConvertArgs) -> CommandResult {
    let (doc, loaded) = load(config, &args.input, args.from.as_deref()).await?;

    let mut saver_config = SaverConfig {
        ensure_trailing_newline: config.editor.ensure_trailing_newline,
        create_backup_copy: config.editor.create_backup_copy,
        chunk_size: config.editor.chunk_size,
        ..SaverConfig::from_loaded(&loaded)
    };
    if let Some(to) = args.to.as_deref() {
        saver_config.encoding = find_encoding(to)?;
    }
    if let Some(newline) = args.newline {
        saver_config.newline = newline;
    }
    saver_config.compression = if args.gzip {
        CompressionType::Gzip
    } else {
        CompressionType::from_path(&args.output)
    };

    // Only an in-place conversion has a load time to compare against.
    let old_mtime = if args.input == args.output {
        loaded.info.mtime
    } else {
        None
    };
    let flags = SaveFlags {
        ignore_mtime: args.force,
        ignore_invalid_chars: args.ignore_invalid,
        ..SaveFlags::default()
    };

    let encoding = saver_config.encoding;
    let saved = DocumentSaver::new(LocalFile::new(&args.output), saver_config)
        .with_flags(flags)
        .with_old_mtime(old_mtime)
        .save(&doc)
        .await?;

    eprintln!(
        "{}: {} bytes written as {}",
        args.output.display(),
        saved.bytes_written,
        encoding
    );
    Ok(())
}

pub fn list_encodings() -> CommandResult {
    let locale = encoding::current_locale();
    let mut stdout = io::stdout().lock();
    for entry in encoding::all() {
        let marker = if std::ptr::eq(entry, locale) { " (locale)" } else { "" };
        writeln!(stdout, "{:<16} {}{}", entry.charset(), entry.name(), marker)?;
    }
    Ok(())
}
