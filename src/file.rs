//! The pixi file object (C12, §4.12): header, layer chain, and tag chain lifecycle.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::io::{ByteOrder, Read, Seek, SeekFrom, Write};
use crate::layer::Layer;
use crate::meta::header::Header;
use crate::tag::{self, TagSection};

/// One appended tag section plus the absolute offset its record was written at,
/// needed to patch its `next_tag_offset` in place when a later section is appended.
struct PlacedTagSection {
    offset: u64,
    section: TagSection,
}

/// A pixi container opened or freshly created over a seekable byte stream, tracking
/// its header and the fully-walked layer and tag chains (§3 "Pixi file").
pub struct PixiFile<S> {
    stream: S,
    header: Header,
    layers: Vec<Layer>,
    tag_sections: Vec<PlacedTagSection>,
}

impl<S: Read + Write + Seek> PixiFile<S> {
    /// Create a brand-new, empty container: writes the header only (§4.5 "Header").
    pub fn create(mut stream: S, offset_size: u8, order: ByteOrder) -> Result<Self> {
        let header = Header::new(1, offset_size, order)?;
        header.write(&mut stream)?;
        Ok(Self { stream, header, layers: Vec::new(), tag_sections: Vec::new() })
    }

    /// Open an existing container: reads the header, then walks both chains in full
    /// (§4.12 "Opens by reading the header and walking both the layer chain and tag
    /// chain").
    pub fn open(mut stream: S) -> Result<Self> {
        let header = Header::read(&mut stream)?;
        let layers = read_layer_chain(&mut stream, header.first_layer_offset, header.offset_size, header.byte_order)?;

        let mut tag_sections = Vec::new();
        let mut next = header.first_tag_offset;
        while next != 0 {
            stream.seek(SeekFrom::Start(next))?;
            let section = TagSection::read(&mut stream, header.offset_size, header.byte_order)?;
            let offset = next;
            next = section.next_tag_offset;
            tag_sections.push(PlacedTagSection { offset, section });
        }

        Ok(Self { stream, header, layers, tag_sections })
    }

    /// The file header (§3 "Header").
    pub fn header(&self) -> &Header { &self.header }

    /// Every layer in chain order.
    pub fn layers(&self) -> &[Layer] { &self.layers }

    /// Layer `index` for mutation (e.g. via a direct accessor built from
    /// [`Self::into_stream`]), along with tile I/O through [`Self::stream_mut`].
    pub fn layer_mut(&mut self, index: usize) -> Result<&mut Layer> {
        self.layers.get_mut(index)
            .ok_or_else(|| Error::range(format!("layer index {index} out of range")))
    }

    /// Borrow the backing stream, for tile I/O against a layer returned by
    /// [`Self::layers`]/[`Self::layer_mut`].
    pub fn stream_mut(&mut self) -> &mut S { &mut self.stream }

    /// Consume the file object, returning its backing stream so an accessor (§4.7-§4.9)
    /// can take ownership of it.
    pub fn into_stream(self) -> S { self.stream }

    /// Append `layer`'s tile storage and record at the stream tail, linking it onto the
    /// chain by patching the previous terminal layer's `next_layer_offset` (or the
    /// header's `first_layer_offset` if this is the first layer). Returns the new
    /// layer's index (§4.12 "AddLayer").
    pub fn add_layer(&mut self, mut layer: Layer) -> Result<usize> {
        self.stream.seek(SeekFrom::End(0))?;
        let self_offset = self.stream.stream_position()?;

        if layer.compression == crate::compression::Compression::None {
            layer.write_blank(&mut self.stream, self.header.offset_size, self.header.byte_order)?;
        } else {
            layer.self_offset = Some(self_offset);
            layer.write(&mut self.stream, self.header.offset_size, self.header.byte_order)?;
        }

        if let Some(last) = self.layers.last_mut() {
            last.next_layer_offset = self_offset;
            last.overwrite_self(&mut self.stream, self.header.offset_size, self.header.byte_order)?;
        } else {
            self.header.first_layer_offset = self_offset;
            self.header.overwrite_offsets(&mut self.stream)?;
        }

        self.layers.push(layer);
        Ok(self.layers.len() - 1)
    }

    /// Append a new tag section at the stream tail, linking it the same way
    /// [`Self::add_layer`] links layers (§4.12 "AddTagSection").
    pub fn add_tag_section(&mut self, tags: HashMap<String, String>) -> Result<usize> {
        let section = TagSection::new(tags);

        self.stream.seek(SeekFrom::End(0))?;
        let self_offset = self.stream.stream_position()?;
        section.write(&mut self.stream, self.header.offset_size, self.header.byte_order)?;

        if let Some(last) = self.tag_sections.last_mut() {
            last.section.next_tag_offset = self_offset;
            self.stream.seek(SeekFrom::Start(last.offset))?;
            last.section.write(&mut self.stream, self.header.offset_size, self.header.byte_order)?;
        } else {
            self.header.first_tag_offset = self_offset;
        }
        self.header.overwrite_offsets(&mut self.stream)?;

        self.tag_sections.push(PlacedTagSection { offset: self_offset, section });
        Ok(self.tag_sections.len() - 1)
    }

    /// The union of every tag section's keys, newest section winning on a shared key
    /// (§4.12 "AllTags", "Duplicate tag key precedence").
    pub fn all_tags(&self) -> HashMap<String, String> {
        let sections: Vec<TagSection> = self.tag_sections.iter().map(|p| p.section.clone()).collect();
        tag::merge_chain(&sections)
    }
}

/// Walk the layer chain starting at `first_layer_offset`, returning every layer in
/// chain (append) order. `first_layer_offset == 0` means an empty chain.
fn read_layer_chain(
    stream: &mut (impl Read + Seek),
    first_layer_offset: u64,
    offset_size: u8,
    order: ByteOrder,
) -> Result<Vec<Layer>> {
    let mut layers = Vec::new();
    let mut next = first_layer_offset;

    while next != 0 {
        stream.seek(SeekFrom::Start(next))?;
        let layer = Layer::read(stream, offset_size, order, next)?;
        next = layer.next_layer_offset;
        layers.push(layer);
    }

    Ok(layers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use crate::compression::Compression;
    use crate::coord::{Dimension, DimensionSet};
    use crate::meta::channel::{Channel, ChannelSet};
    use crate::value::ChannelType;

    fn dims_2d() -> DimensionSet {
        DimensionSet::new(vec![
            Dimension::new("x", 4, 2).unwrap(),
            Dimension::new("y", 4, 2).unwrap(),
        ]).unwrap()
    }

    #[test]
    fn two_layer_chain_round_trips_through_reopen() {
        let stream = Cursor::new(Vec::new());
        let mut file = PixiFile::create(stream, 8, ByteOrder::Little).unwrap();

        let l1 = Layer::new(
            "l1", false, Compression::None, dims_2d(),
            ChannelSet::new(vec![Channel::new("a", ChannelType::I32)]).unwrap(),
        );
        let l2 = Layer::new(
            "l2", true, Compression::None, dims_2d(),
            ChannelSet::new(vec![
                Channel::new("r", ChannelType::U8), Channel::new("g", ChannelType::U8),
                Channel::new("b", ChannelType::U8), Channel::new("a", ChannelType::U8),
            ]).unwrap(),
        );

        file.add_layer(l1).unwrap();
        file.add_layer(l2).unwrap();

        let stream = file.into_stream();
        let reopened = PixiFile::open(stream).unwrap();

        assert_eq!(reopened.layers().len(), 2);
        assert_eq!(reopened.layers()[0].name, "l1");
        assert_eq!(reopened.layers()[1].name, "l2");
        assert_eq!(reopened.layers()[0].next_layer_offset, reopened.layers()[1].self_offset.unwrap());
        assert_eq!(reopened.layers()[1].next_layer_offset, 0);
    }

    #[test]
    fn tag_sections_merge_with_newest_winning() {
        let stream = Cursor::new(Vec::new());
        let mut file = PixiFile::create(stream, 8, ByteOrder::Little).unwrap();

        let mut first = HashMap::new();
        first.insert("crs".to_string(), "epsg:4326".to_string());
        file.add_tag_section(first).unwrap();

        let mut second = HashMap::new();
        second.insert("crs".to_string(), "epsg:3857".to_string());
        second.insert("sensor".to_string(), "landsat".to_string());
        file.add_tag_section(second).unwrap();

        let stream = file.into_stream();
        let reopened = PixiFile::open(stream).unwrap();

        let tags = reopened.all_tags();
        assert_eq!(tags.get("crs"), Some(&"epsg:3857".to_string()));
        assert_eq!(tags.get("sensor"), Some(&"landsat".to_string()));
    }

    #[test]
    fn empty_file_has_no_layers_or_tags() {
        let stream = Cursor::new(Vec::new());
        let file = PixiFile::create(stream, 4, ByteOrder::Big).unwrap();
        let stream = file.into_stream();
        let reopened = PixiFile::open(stream).unwrap();
        assert!(reopened.layers().is_empty());
        assert!(reopened.all_tags().is_empty());
    }
}
