use std::io::{Read, Seek, Write};
use std::path::Path;

use log::{info, warn};

use crate::error::PanelError;
use crate::excellon;
use crate::gerber;
use crate::layer::Layer;
use crate::{detect_format, LayerFormat};

use super::settings::BatchSettings;
use super::Batch;

/// Load a batch from a ZIP archive of drawings and drill files, recognised by their
/// extension (`.gbr`, `.gtl`, ... and `.drl`, `.xln`).
///
/// Directories and entries with other extensions are skipped.
pub fn read_batch<R: Read + Seek>(name: &str, reader: R) -> Result<Batch, PanelError> {
    let mut archive = zip::ZipArchive::new(reader)?;
    let mut batch = Batch::new(name);

    for i in 0..archive.len() {
        let mut file = archive.by_index(i)?;
        if file.is_dir() {
            continue;
        }
        let filename = file.name().to_string();
        let Some(format) = detect_format(Path::new(&filename)) else {
            warn!("{name}: skipping archive entry {filename}");
            continue;
        };

        let mut content = String::new();
        file.read_to_string(&mut content)?;
        match format {
            LayerFormat::Gerber => batch.add_drawing(&filename, content.as_bytes())?,
            LayerFormat::Excellon => batch.add_drill(&filename, content.as_bytes())?,
        };
    }

    info!("Read batch {name}: {} layers", batch.layers().count());
    Ok(batch)
}

/// Write every layer of `batch` as one archive entry named by `settings`, returning
/// the finished writer.
pub fn write_batch<W: Write + Seek>(
    batch: &Batch,
    settings: &BatchSettings,
    writer: W,
) -> Result<W, PanelError> {
    let mut zip = zip::ZipWriter::new(writer);
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);

    for (function, layer) in batch.layers() {
        let filename = settings.filename(function, batch.name());
        zip.start_file(filename.as_str(), options)?;
        match layer {
            Layer::Gerber(g) => gerber::write(g, &mut zip)?,
            Layer::Excellon(e) => excellon::write(e, &mut zip)?,
        }
        info!("Wrote {filename}");
    }

    Ok(zip.finish()?)
}
