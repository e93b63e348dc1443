// ABOUTME: Object-graph encoding on top of the wire codec: template IDs, envelopes,
// ABOUTME: back-references, pre-created shells, completion hooks and the Codec entry point.

use crate::error::{Error, Result};
use crate::packer::Packer;
use crate::schema::{Schema, SchemaManager};
use crate::template::{ContainerShape, Template, TemplateRegistry, Tracking};
use crate::tracker::{PackTracker, UnpackTracker};
use crate::translator::{IdentityTranslator, TypeNameTranslator};
use crate::types::{limits, FORMAT_VERSION, INDEX_BIAS};
use crate::unpacker::{Event, Unpacker, UnpackerConfig};
use crate::value::{ElementType, ObjectArray, ObjectRef, Value};
use std::io::{Read, Write};
use std::sync::Arc;
use tracing::debug;

// On the wire, every object-level integer is `logical - INDEX_BIAS`:
//
//   0                     null
//   -p                    back-reference to tracked position p
//   [id, payload]         full object written by template `id`
//   [id, depth, [items]]  object array of element template `id`
//
// The payload of an ARRAY or MAP template is a container of its slots;
// PRIMITIVE and RAW payloads are the single slot itself.

fn to_wire_index(logical: i64) -> Result<i64> {
    logical
        .checked_sub(INDEX_BIAS)
        .ok_or_else(|| Error::UnsupportedValue(format!("index {logical} out of range")))
}

fn id_to_logical(id: usize) -> Result<i64> {
    i64::try_from(id).map_err(|_| Error::UnsupportedValue(format!("ID {id} out of range")))
}

fn describe(event: &Event) -> String {
    match event {
        Event::Raw(bytes) => format!("raw value of {} bytes", bytes.len()),
        Event::ArrayBegin(n) => format!("array of {n}"),
        Event::MapBegin(n) => format!("map of {n} pairs"),
        other => format!("{other:?}"),
    }
}

/// Writes values of an object graph, handing each to its template.
///
/// Templates receive this in [`Template::write_data`] and write their slots
/// either as plain wire values through [`ObjectPacker::packer`] or as
/// nested objects through [`ObjectPacker::write_value`].
pub struct ObjectPacker<'a> {
    packer: Packer<&'a mut dyn Write>,
    schema: Arc<Schema>,
    translator: &'a dyn TypeNameTranslator,
    tracker: PackTracker,
    depth: usize,
    max_depth: usize,
}

impl<'a> ObjectPacker<'a> {
    pub fn new(
        writer: &'a mut dyn Write,
        schema: Arc<Schema>,
        translator: &'a dyn TypeNameTranslator,
    ) -> Self {
        Self {
            packer: Packer::new(writer),
            schema,
            translator,
            tracker: PackTracker::new(),
            depth: 0,
            max_depth: limits::MAX_OBJECT_DEPTH,
        }
    }

    #[must_use]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// The wire encoder, for writing plain slots.
    pub fn packer(&mut self) -> &mut Packer<&'a mut dyn Write> {
        &mut self.packer
    }

    #[must_use]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    #[must_use]
    pub fn translator(&self) -> &dyn TypeNameTranslator {
        self.translator
    }

    /// Write the stream header: format version, then schema ID.
    pub fn write_header(&mut self) -> Result<()> {
        self.write_index(i64::from(self.schema.format()))?;
        self.write_index(i64::from(self.schema.schema_id()))
    }

    fn write_index(&mut self, logical: i64) -> Result<()> {
        let wire = to_wire_index(logical)?;
        self.packer.write_i64(wire)
    }

    fn write_back_ref(&mut self, pos: usize) -> Result<()> {
        self.write_index(-id_to_logical(pos)?)
    }

    /// Write one value as exactly one wire slot.
    ///
    /// Null becomes ID 0, a repeat of a tracked value becomes a
    /// back-reference, and anything else is written in full.
    pub fn write_value(&mut self, value: &Value) -> Result<()> {
        if value.is_null() {
            return self.write_index(0);
        }
        if let Some(obj) = value.as_object() {
            if obj.is::<ObjectArray>() {
                return self.write_object_array(obj);
            }
        }

        let (id, template) = self.schema.lookup(value)?;
        if template.tracking() != Tracking::DoNotTrack {
            let seen = match value {
                Value::String(s) => self.tracker.track_equal(s),
                Value::Object(obj) => self.tracker.track_identity(obj),
                _ => {
                    self.tracker.skip_position();
                    None
                }
            };
            if let Some(pos) = seen {
                return self.write_back_ref(pos);
            }
        }

        self.enter()?;
        self.packer.begin_array(2)?;
        self.write_index(id_to_logical(id)?)?;
        self.write_payload(template.as_ref(), value)?;
        self.packer.end_array(true)?;
        self.depth -= 1;
        Ok(())
    }

    fn write_payload(&mut self, template: &dyn Template, value: &Value) -> Result<()> {
        match template.shape() {
            ContainerShape::Array => {
                let size = template.space_required(value)?;
                self.packer.begin_array(size)?;
                template.write_data(value, self)?;
                self.packer.end_array(true)
            }
            ContainerShape::Map => {
                let size = template.space_required(value)?;
                if size % 2 != 0 {
                    return Err(Error::UnsupportedValue(format!(
                        "{} reported an odd slot count {size} for a map",
                        template.type_name()
                    )));
                }
                self.packer.begin_map(size / 2)?;
                template.write_data(value, self)?;
                self.packer.end_map(true)
            }
            ContainerShape::Primitive | ContainerShape::Raw => template.write_data(value, self),
        }
    }

    fn write_object_array(&mut self, obj: &ObjectRef) -> Result<()> {
        if let Some(pos) = self.tracker.track_identity(obj) {
            return self.write_back_ref(pos);
        }
        let array = obj.borrow::<ObjectArray>().ok_or_else(|| {
            Error::UnexpectedType(format!("expected an object array, got {}", obj.type_name()))
        })?;
        let id = self.schema.id_of_type(array.element.type_id).ok_or_else(|| {
            Error::UnresolvedTemplate(format!(
                "no template for array element type {}",
                array.element.type_name
            ))
        })?;

        self.enter()?;
        self.packer.begin_array(3)?;
        self.write_index(id_to_logical(id)?)?;
        self.packer.write_u64(array.depth as u64)?;
        self.packer.begin_array(array.items.len())?;
        for item in &array.items {
            self.write_value(item)?;
        }
        self.packer.end_array(true)?;
        self.packer.end_array(true)?;
        self.depth -= 1;
        Ok(())
    }

    fn enter(&mut self) -> Result<()> {
        if self.depth >= self.max_depth {
            return Err(Error::MaxDepthExceeded);
        }
        self.depth += 1;
        Ok(())
    }

    /// Flush the sink and check that every container was closed.
    pub fn finish(self) -> Result<()> {
        self.packer.finish()?;
        Ok(())
    }
}

/// Reads values of an object graph, handing each to its template.
pub struct ObjectUnpacker<'a> {
    unpacker: Unpacker<&'a mut dyn Read>,
    schema: Arc<Schema>,
    translator: &'a dyn TypeNameTranslator,
    tracker: UnpackTracker,
    /// Hook entries in the order their objects started reading; filled
    /// once each object is complete
    completions: Vec<Option<(Arc<dyn Template>, Value)>>,
    depth: usize,
    max_depth: usize,
}

impl<'a> ObjectUnpacker<'a> {
    pub fn new(
        unpacker: Unpacker<&'a mut dyn Read>,
        schema: Arc<Schema>,
        translator: &'a dyn TypeNameTranslator,
    ) -> Self {
        Self {
            unpacker,
            schema,
            translator,
            tracker: UnpackTracker::new(),
            completions: Vec::new(),
            depth: 0,
            max_depth: limits::MAX_OBJECT_DEPTH,
        }
    }

    #[must_use]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// The wire decoder, for reading plain slots.
    pub fn unpacker(&mut self) -> &mut Unpacker<&'a mut dyn Read> {
        &mut self.unpacker
    }

    #[must_use]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    #[must_use]
    pub fn translator(&self) -> &dyn TypeNameTranslator {
        self.translator
    }

    fn logical(event: &Event) -> Result<i64> {
        event
            .as_i64()
            .and_then(|wire| wire.checked_add(INDEX_BIAS))
            .ok_or_else(|| Error::UnsupportedValue(format!("index {} out of range", describe(event))))
    }

    fn read_id(&mut self) -> Result<usize> {
        let event = self.unpacker.read_event()?;
        if !event.is_int() {
            return Err(Error::UnexpectedType(format!(
                "expected a template ID, got {}",
                describe(&event)
            )));
        }
        let logical = Self::logical(&event)?;
        usize::try_from(logical)
            .ok()
            .filter(|&id| id > 0)
            .ok_or_else(|| Error::UnresolvedTemplate(format!("invalid template ID {logical}")))
    }

    /// Read one value written by [`ObjectPacker::write_value`].
    pub fn read_value(&mut self) -> Result<Value> {
        let event = self.unpacker.read_event()?;
        match event {
            Event::ArrayBegin(2) => self.read_object(),
            Event::ArrayBegin(3) => self.read_object_array(),
            ref e if e.is_int() => {
                let logical = Self::logical(e)?;
                if logical == 0 {
                    return Ok(Value::Null);
                }
                if logical > 0 {
                    return Err(Error::UnexpectedType(format!(
                        "template ID {logical} outside an object envelope"
                    )));
                }
                let pos = usize::try_from(logical.unsigned_abs())
                    .map_err(|_| Error::InvalidReference(usize::MAX))?;
                self.tracker.get(pos)
            }
            other => Err(Error::UnexpectedType(format!(
                "expected an object or reference, got {}",
                describe(&other)
            ))),
        }
    }

    fn read_object(&mut self) -> Result<Value> {
        let id = self.read_id()?;
        let template = Arc::clone(self.schema.template(id)?);
        self.enter()?;

        let shape = template.shape();
        let size = match shape {
            ContainerShape::Array => self.unpacker.read_array_begin()?,
            ContainerShape::Map => self.unpacker.read_map_begin()? * 2,
            ContainerShape::Primitive | ContainerShape::Raw => 1,
        };
        let pos = (template.tracking() != Tracking::DoNotTrack).then(|| self.tracker.reserve());
        let hook = template.has_completion_hook().then(|| {
            self.completions.push(None);
            self.completions.len() - 1
        });
        let shell = template.pre_create(size);
        if let (Some(pos), Some(shell)) = (pos, &shell) {
            self.tracker.fill(pos, Value::Object(shell.clone()));
        }

        let value = template.read_data(shell.as_ref(), size, self)?;
        if let (Some(pos), None) = (pos, &shell) {
            self.tracker.fill(pos, value.clone());
        }
        match shape {
            ContainerShape::Array => self.unpacker.read_array_end(true)?,
            ContainerShape::Map => self.unpacker.read_map_end(true)?,
            ContainerShape::Primitive | ContainerShape::Raw => {}
        }
        self.unpacker.read_array_end(true)?;

        if let Some(hook) = hook {
            self.completions[hook] = Some((template, value.clone()));
        }
        self.depth -= 1;
        Ok(value)
    }

    fn read_object_array(&mut self) -> Result<Value> {
        let id = self.read_id()?;
        let template = self.schema.template(id)?;
        let element = ElementType {
            type_id: template.target_type(),
            type_name: template.type_name(),
        };
        self.enter()?;

        let depth = usize::try_from(self.unpacker.read_u64()?)
            .ok()
            .filter(|&d| d > 0)
            .ok_or_else(|| Error::UnexpectedType("object array depth must be positive".into()))?;
        let len = self.unpacker.read_array_begin()?;
        let obj = ObjectRef::new(ObjectArray {
            element,
            depth,
            items: Vec::with_capacity(len),
        });
        let pos = self.tracker.reserve();
        self.tracker.fill(pos, Value::Object(obj.clone()));

        for _ in 0..len {
            let item = self.read_value()?;
            if let Some(mut array) = obj.borrow_mut::<ObjectArray>() {
                array.items.push(item);
            }
        }
        self.unpacker.read_array_end(true)?;
        self.unpacker.read_array_end(true)?;
        self.depth -= 1;
        Ok(Value::Object(obj))
    }

    fn enter(&mut self) -> Result<()> {
        if self.depth >= self.max_depth {
            return Err(Error::MaxDepthExceeded);
        }
        self.depth += 1;
        Ok(())
    }

    /// Run the completion hooks collected so far, in the order their
    /// objects were registered (started reading).
    pub fn complete(&mut self) -> Result<()> {
        if self.completions.is_empty() {
            return Ok(());
        }
        debug!(count = self.completions.len(), "running completion hooks");
        for (template, value) in self.completions.drain(..).flatten() {
            template.complete(&value)?;
        }
        Ok(())
    }

    /// Check that every container was closed.
    pub fn finish(self) -> Result<()> {
        self.unpacker.finish()?;
        Ok(())
    }
}

/// Settings for a [`Codec`].
#[derive(Debug, Clone, Copy)]
pub struct CodecConfig {
    /// Schema version written into new streams (default: 1)
    pub schema_id: u32,
    /// Maximum object nesting on both sides (default: `limits::MAX_OBJECT_DEPTH`)
    pub max_depth: usize,
    /// Accept bytes after the root object in [`Codec::unpack`] (default: false)
    pub allow_trailing_bytes: bool,
    /// Size and nesting limits for the wire decoder
    pub unpacker: UnpackerConfig,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            schema_id: 1,
            max_depth: limits::MAX_OBJECT_DEPTH,
            allow_trailing_bytes: false,
            unpacker: UnpackerConfig::default(),
        }
    }
}

/// Packs and unpacks whole object graphs.
///
/// A codec shares its [`SchemaManager`] between clones, so schemas are
/// built once however many codecs or threads use them.
#[derive(Clone)]
pub struct Codec {
    schemas: Arc<SchemaManager>,
    translator: Arc<dyn TypeNameTranslator>,
    config: CodecConfig,
}

impl Codec {
    /// A codec over the built-in templates plus those in `registry`.
    #[must_use]
    pub fn new(registry: TemplateRegistry) -> Self {
        Self::with_manager(Arc::new(SchemaManager::new(registry)))
    }

    #[must_use]
    pub fn with_manager(schemas: Arc<SchemaManager>) -> Self {
        Self {
            schemas,
            translator: Arc::new(IdentityTranslator),
            config: CodecConfig::default(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: CodecConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn with_translator(mut self, translator: Arc<dyn TypeNameTranslator>) -> Self {
        self.translator = translator;
        self
    }

    #[must_use]
    pub fn config(&self) -> &CodecConfig {
        &self.config
    }

    #[must_use]
    pub fn schema_manager(&self) -> &Arc<SchemaManager> {
        &self.schemas
    }

    /// Pack `value` under the configured schema.
    pub fn pack(&self, value: &Value) -> Result<Vec<u8>> {
        self.pack_to_writer(Vec::new(), value)
    }

    /// Pack `value` into `writer` and return the writer.
    pub fn pack_to_writer<W: Write>(&self, mut writer: W, value: &Value) -> Result<W> {
        let schema = self.schemas.schema(FORMAT_VERSION, self.config.schema_id)?;
        let mut out = ObjectPacker::new(&mut writer, schema, self.translator.as_ref())
            .with_max_depth(self.config.max_depth);
        out.write_header()?;
        out.write_value(value)?;
        out.finish()?;
        Ok(writer)
    }

    /// Unpack one graph from a complete buffer.
    pub fn unpack(&self, data: &[u8]) -> Result<Value> {
        let mut rest = data;
        let value = self.unpack_from_reader(&mut rest)?;
        if !rest.is_empty() && !self.config.allow_trailing_bytes {
            return Err(Error::TrailingBytes);
        }
        Ok(value)
    }

    /// Unpack one graph from a reader, using the schema named in its header.
    pub fn unpack_from_reader<R: Read>(&self, mut reader: R) -> Result<Value> {
        let mut unpacker =
            Unpacker::with_config(&mut reader as &mut dyn Read, self.config.unpacker);
        let format = read_header_field(&mut unpacker, "format version")?;
        let schema_id = read_header_field(&mut unpacker, "schema ID")?;
        let schema = self.schemas.schema(format, schema_id)?;

        let mut input = ObjectUnpacker::new(unpacker, schema, self.translator.as_ref())
            .with_max_depth(self.config.max_depth);
        let root = input.read_value()?;
        input.complete()?;
        input.finish()?;
        Ok(root)
    }
}

impl Default for Codec {
    fn default() -> Self {
        Self::new(TemplateRegistry::new())
    }
}

fn read_header_field<R: Read>(unpacker: &mut Unpacker<R>, what: &str) -> Result<u32> {
    let wire = unpacker.read_i64()?;
    wire.checked_add(INDEX_BIAS)
        .and_then(|logical| u32::try_from(logical).ok())
        .ok_or_else(|| Error::UnsupportedValue(format!("{what} {wire} out of range")))
}
