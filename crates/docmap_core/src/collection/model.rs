//! Model contract for typed collections.

use crate::entity::ErasedHandle;
use crate::error::CoreResult;
use crate::schema::Schema;
use crate::types::ModelKey;
use docmap_codec::{CodecResult, Document, EntityId};

/// Trait for types stored as entities in a docmap collection.
///
/// Implementors must provide:
/// - `COLLECTION`: the collection the model maps to, also its type key
/// - `schema()`: the declared field layout, references included
/// - `id()`: the stable, immutable entity identifier
/// - `encode()` / `decode()`: conversion to and from a stored document
///
/// Lifecycle hooks default to no-ops. A failing `will_save` or
/// `will_delete` aborts the operation and its error reaches the caller
/// unchanged.
///
/// # Example
///
/// ```rust
/// use docmap_codec::{doc, CodecResult, Document, DocumentReader, EntityId, ID_KEY};
/// use docmap_core::schema::{FieldKind, Schema};
/// use docmap_core::Model;
///
/// struct Tag {
///     id: EntityId,
///     label: String,
/// }
///
/// impl Model for Tag {
///     const COLLECTION: &'static str = "tags";
///
///     fn schema() -> Schema {
///         Schema::new(Self::COLLECTION).field("label", FieldKind::Text)
///     }
///
///     fn id(&self) -> EntityId {
///         self.id
///     }
///
///     fn encode(&self) -> Document {
///         doc! { ID_KEY => self.id, "label" => self.label.clone() }
///     }
///
///     fn decode(doc: &Document) -> CodecResult<Self> {
///         let reader = DocumentReader::new(doc);
///         Ok(Tag {
///             id: reader.field(ID_KEY)?,
///             label: reader.field("label")?,
///         })
///     }
/// }
/// ```
pub trait Model: Sized + Send + Sync + 'static {
    /// Collection name; identifies the model type.
    const COLLECTION: ModelKey;

    /// Returns the declared field layout.
    fn schema() -> Schema;

    /// Returns the entity's stable, immutable identifier.
    fn id(&self) -> EntityId;

    /// Encodes the entity to a document.
    ///
    /// The `_id` field is always set to [`Model::id`] before writing, so
    /// encoders may leave it out.
    fn encode(&self) -> Document;

    /// Decodes an entity from a stored document.
    ///
    /// Errors must carry the path of the offending field.
    fn decode(doc: &Document) -> CodecResult<Self>;

    /// Entities this one owns, saved before it on every written save.
    fn owned_references(&self) -> Vec<Box<dyn ErasedHandle>> {
        Vec::new()
    }

    /// Called before a save. An error aborts the save.
    fn will_save(&mut self) -> CoreResult<()> {
        Ok(())
    }

    /// Called after a save; `was_updated` is false when the write was
    /// skipped because nothing changed.
    fn did_save(&self, was_updated: bool) -> CoreResult<()> {
        let _ = was_updated;
        Ok(())
    }

    /// Called before a delete. An error aborts the delete.
    fn will_delete(&self) -> CoreResult<()> {
        Ok(())
    }

    /// Called after the document was removed.
    fn did_delete(&self) -> CoreResult<()> {
        Ok(())
    }
}
