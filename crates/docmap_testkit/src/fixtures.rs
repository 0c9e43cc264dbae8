//! Fixture models and database helpers.
//!
//! The models form a small blog:
//!
//! - `Post.author` references `User` with `Cascade`: deleting a user
//!   deletes their posts.
//! - `Comment.post` references `Post` with `Deny`: a commented post cannot
//!   be deleted.
//! - `Post.tags` references `Tag` with `Ignore`.

use docmap_codec::{
    decode_enum, doc, encode_enum, CodecResult, Document, DocumentReader, EntityId, EnumCases,
    FieldPath, FieldValue, Timestamp, Value, ID_KEY,
};
use docmap_core::schema::{DeleteRule, FieldDescriptor, FieldKind, Registry, Schema};
use docmap_core::{
    Config, CoreError, CoreResult, Database, ErasedHandle, Field, Handle, Model, ModelKey,
    Reference,
};
use docmap_store::InMemoryStore;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// A lifecycle hook invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookEvent {
    /// `will_save` ran.
    WillSave,
    /// `did_save` ran.
    DidSave {
        /// Whether the save wrote.
        was_updated: bool,
    },
    /// `will_delete` ran.
    WillDelete,
    /// `did_delete` ran.
    DidDelete,
}

/// Shared, in-memory record of hook invocations. Never persisted.
#[derive(Debug, Clone, Default)]
pub struct HookLog(Arc<Mutex<Vec<HookEvent>>>);

impl HookLog {
    fn push(&self, event: HookEvent) {
        self.0.lock().push(event);
    }

    /// Every recorded event, oldest first.
    #[must_use]
    pub fn events(&self) -> Vec<HookEvent> {
        self.0.lock().clone()
    }

    /// The `was_updated` flags of every `did_save`, oldest first.
    #[must_use]
    pub fn save_flags(&self) -> Vec<bool> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                HookEvent::DidSave { was_updated } => Some(was_updated),
                _ => None,
            })
            .collect()
    }
}

/// A user's role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Full access.
    Admin,
    /// Regular member.
    Member,
}

impl EnumCases for Role {
    const NAME: &'static str = "Role";
    const CASES: &'static [(&'static str, Self)] = &[("admin", Role::Admin), ("member", Role::Member)];
}

impl FieldValue for Role {
    fn encode(&self) -> Value {
        encode_enum(self)
    }

    fn decode(value: Option<&Value>, path: &FieldPath) -> CodecResult<Self> {
        decode_enum(value, path)
    }
}

/// Postal address, embedded in `User`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Address {
    /// Street line.
    pub street: String,
    /// City.
    pub city: String,
}

impl Address {
    fn descriptors() -> Vec<FieldDescriptor> {
        vec![
            FieldDescriptor::new("street", FieldKind::Text),
            FieldDescriptor::new("city", FieldKind::Text),
        ]
    }
}

impl FieldValue for Address {
    fn encode(&self) -> Value {
        Value::Document(doc! {
            "street" => self.street.clone(),
            "city" => self.city.clone(),
        })
    }

    fn decode(value: Option<&Value>, path: &FieldPath) -> CodecResult<Self> {
        let reader = DocumentReader::embedded(value, path)?;
        Ok(Self {
            street: reader.field("street")?,
            city: reader.field("city")?,
        })
    }
}

/// A user account.
#[derive(Debug, Clone)]
pub struct User {
    /// Identifier.
    pub id: EntityId,
    /// Display name.
    pub name: String,
    /// Age in years.
    pub age: i32,
    /// Optional e-mail address.
    pub email: Option<String>,
    /// Postal address.
    pub address: Address,
    /// Free-form tags; duplicates allowed.
    pub tags: Vec<String>,
    /// Role.
    pub role: Role,
    /// Sign-up time.
    pub joined: Timestamp,
    /// Hook invocations on this instance.
    pub hooks: HookLog,
    /// Makes the next `will_save` fail.
    pub fail_next_save: bool,
}

impl User {
    /// A member aged `age` with a fresh identifier.
    #[must_use]
    pub fn new(name: &str, age: i32) -> Self {
        Self {
            id: EntityId::new(),
            name: name.to_string(),
            age,
            email: None,
            address: Address {
                street: "1 Main St".into(),
                city: "Springfield".into(),
            },
            tags: Vec::new(),
            role: Role::Member,
            joined: Timestamp::from_millis(1_700_000_000_000),
            hooks: HookLog::default(),
            fail_next_save: false,
        }
    }

    /// Typed field proxies.
    #[must_use]
    pub fn fields() -> UserFields {
        UserFields {
            id: Field::id(),
            name: Field::new("name"),
            age: Field::new("age"),
            email: Field::new("email"),
            city: Field::nested("address", "city"),
            tags: Field::new("tags"),
            role: Field::new("role"),
            joined: Field::new("joined"),
        }
    }
}

impl PartialEq for User {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.name == other.name
            && self.age == other.age
            && self.email == other.email
            && self.address == other.address
            && self.tags == other.tags
            && self.role == other.role
            && self.joined == other.joined
    }
}

/// Field proxies of [`User`].
#[derive(Debug, Clone)]
pub struct UserFields {
    /// `_id`
    pub id: Field<User, EntityId>,
    /// `name`
    pub name: Field<User, String>,
    /// `age`
    pub age: Field<User, i32>,
    /// `email`
    pub email: Field<User, Option<String>>,
    /// `address.city`
    pub city: Field<User, String>,
    /// `tags`
    pub tags: Field<User, Vec<String>>,
    /// `role`
    pub role: Field<User, Role>,
    /// `joined`
    pub joined: Field<User, Timestamp>,
}

impl Model for User {
    const COLLECTION: ModelKey = "users";

    fn schema() -> Schema {
        Schema::new(Self::COLLECTION)
            .field("name", FieldKind::Text)
            .field("age", FieldKind::Int32)
            .field("email", FieldKind::optional(FieldKind::Text))
            .field("address", FieldKind::Embedded(Address::descriptors()))
            .field("tags", FieldKind::array_of(FieldKind::Text))
            .field("role", FieldKind::Enum(&["admin", "member"]))
            .field("joined", FieldKind::Date)
    }

    fn id(&self) -> EntityId {
        self.id
    }

    fn encode(&self) -> Document {
        doc! {
            ID_KEY => self.id,
            "name" => self.name.clone(),
            "age" => self.age,
            "email" => self.email.encode(),
            "address" => self.address.encode(),
            "tags" => self.tags.encode(),
            "role" => self.role.encode(),
            "joined" => self.joined,
        }
    }

    fn decode(doc: &Document) -> CodecResult<Self> {
        let reader = DocumentReader::new(doc);
        Ok(Self {
            id: reader.field(ID_KEY)?,
            name: reader.field("name")?,
            age: reader.field("age")?,
            email: reader.field("email")?,
            address: reader.field("address")?,
            tags: reader.field("tags")?,
            role: reader.field("role")?,
            joined: reader.field("joined")?,
            hooks: HookLog::default(),
            fail_next_save: false,
        })
    }

    fn will_save(&mut self) -> CoreResult<()> {
        self.hooks.push(HookEvent::WillSave);
        if std::mem::take(&mut self.fail_next_save) {
            return Err(CoreError::hook("user rejected the save"));
        }
        Ok(())
    }

    fn did_save(&self, was_updated: bool) -> CoreResult<()> {
        self.hooks.push(HookEvent::DidSave { was_updated });
        Ok(())
    }

    fn will_delete(&self) -> CoreResult<()> {
        self.hooks.push(HookEvent::WillDelete);
        Ok(())
    }

    fn did_delete(&self) -> CoreResult<()> {
        self.hooks.push(HookEvent::DidDelete);
        Ok(())
    }
}

/// A label attached to posts. Locked tags refuse deletion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    /// Identifier.
    pub id: EntityId,
    /// Label text.
    pub label: String,
    /// When set, `will_delete` fails.
    pub locked: bool,
    /// When set, `will_save` sleeps this long. Never persisted.
    pub save_delay: Option<Duration>,
}

impl Tag {
    /// An unlocked tag.
    #[must_use]
    pub fn new(label: &str) -> Self {
        Self {
            id: EntityId::new(),
            label: label.to_string(),
            locked: false,
            save_delay: None,
        }
    }

    /// Typed field proxies.
    #[must_use]
    pub fn fields() -> TagFields {
        TagFields {
            label: Field::new("label"),
            locked: Field::new("locked"),
        }
    }
}

/// Field proxies of [`Tag`].
#[derive(Debug, Clone)]
pub struct TagFields {
    /// `label`
    pub label: Field<Tag, String>,
    /// `locked`
    pub locked: Field<Tag, bool>,
}

impl Model for Tag {
    const COLLECTION: ModelKey = "tags";

    fn schema() -> Schema {
        Schema::new(Self::COLLECTION)
            .field("label", FieldKind::Text)
            .field("locked", FieldKind::Bool)
    }

    fn id(&self) -> EntityId {
        self.id
    }

    fn encode(&self) -> Document {
        doc! { "label" => self.label.clone(), "locked" => self.locked }
    }

    fn decode(doc: &Document) -> CodecResult<Self> {
        let reader = DocumentReader::new(doc);
        Ok(Self {
            id: reader.field(ID_KEY)?,
            label: reader.field("label")?,
            locked: reader.field("locked")?,
            save_delay: None,
        })
    }

    fn will_save(&mut self) -> CoreResult<()> {
        if let Some(delay) = self.save_delay {
            std::thread::sleep(delay);
        }
        Ok(())
    }

    fn will_delete(&self) -> CoreResult<()> {
        if self.locked {
            return Err(CoreError::hook(format!("tag `{}` is locked", self.label)));
        }
        Ok(())
    }
}

/// A blog post.
#[derive(Debug, Clone)]
pub struct Post {
    /// Identifier.
    pub id: EntityId,
    /// Title.
    pub title: String,
    /// Author; deleting the author deletes the post.
    pub author: Reference<User>,
    /// Tags; never constrain deletion.
    pub tags: Vec<Reference<Tag>>,
    /// Tags attached in memory and saved along with the post.
    pub owned_tags: Vec<Handle<Tag>>,
}

impl Post {
    /// A post by `author` without tags.
    #[must_use]
    pub fn new(title: &str, author: &Handle<User>) -> Self {
        Self {
            id: EntityId::new(),
            title: title.to_string(),
            author: Reference::from(author),
            tags: Vec::new(),
            owned_tags: Vec::new(),
        }
    }

    /// References `tag` and saves it with the post.
    pub fn attach_tag(&mut self, tag: Handle<Tag>) {
        self.tags.push(Reference::from(&tag));
        self.owned_tags.push(tag);
    }

    /// Typed field proxies.
    #[must_use]
    pub fn fields() -> PostFields {
        PostFields {
            title: Field::new("title"),
            author: Field::new("author"),
            tags: Field::new("tags"),
        }
    }
}

/// Field proxies of [`Post`].
#[derive(Debug, Clone)]
pub struct PostFields {
    /// `title`
    pub title: Field<Post, String>,
    /// `author`
    pub author: Field<Post, Reference<User>>,
    /// `tags`
    pub tags: Field<Post, Vec<Reference<Tag>>>,
}

impl Model for Post {
    const COLLECTION: ModelKey = "posts";

    fn schema() -> Schema {
        Schema::new(Self::COLLECTION)
            .field("title", FieldKind::Text)
            .field("author", FieldKind::reference(User::COLLECTION, DeleteRule::Cascade))
            .field(
                "tags",
                FieldKind::array_of(FieldKind::reference(Tag::COLLECTION, DeleteRule::Ignore)),
            )
    }

    fn id(&self) -> EntityId {
        self.id
    }

    fn encode(&self) -> Document {
        doc! {
            "title" => self.title.clone(),
            "author" => self.author.encode(),
            "tags" => self.tags.encode(),
        }
    }

    fn decode(doc: &Document) -> CodecResult<Self> {
        let reader = DocumentReader::new(doc);
        Ok(Self {
            id: reader.field(ID_KEY)?,
            title: reader.field("title")?,
            author: reader.field("author")?,
            tags: reader.field("tags")?,
            owned_tags: Vec::new(),
        })
    }

    fn owned_references(&self) -> Vec<Box<dyn ErasedHandle>> {
        self.owned_tags.iter().map(Handle::erased).collect()
    }
}

/// A comment on a post. Blocks deleting the post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment {
    /// Identifier.
    pub id: EntityId,
    /// The commented post.
    pub post: Reference<Post>,
    /// Body text.
    pub text: String,
}

impl Comment {
    /// A comment on `post`.
    #[must_use]
    pub fn new(post: &Handle<Post>, text: &str) -> Self {
        Self {
            id: EntityId::new(),
            post: Reference::from(post),
            text: text.to_string(),
        }
    }

    /// Typed field proxies.
    #[must_use]
    pub fn fields() -> CommentFields {
        CommentFields {
            post: Field::new("post"),
            text: Field::new("text"),
        }
    }
}

/// Field proxies of [`Comment`].
#[derive(Debug, Clone)]
pub struct CommentFields {
    /// `post`
    pub post: Field<Comment, Reference<Post>>,
    /// `text`
    pub text: Field<Comment, String>,
}

impl Model for Comment {
    const COLLECTION: ModelKey = "comments";

    fn schema() -> Schema {
        Schema::new(Self::COLLECTION)
            .field("post", FieldKind::reference(Post::COLLECTION, DeleteRule::Deny))
            .field("text", FieldKind::Text)
    }

    fn id(&self) -> EntityId {
        self.id
    }

    fn encode(&self) -> Document {
        doc! { "post" => self.post.encode(), "text" => self.text.clone() }
    }

    fn decode(doc: &Document) -> CodecResult<Self> {
        let reader = DocumentReader::new(doc);
        Ok(Self {
            id: reader.field(ID_KEY)?,
            post: reader.field("post")?,
            text: reader.field("text")?,
        })
    }
}

/// Registry with every fixture model.
#[must_use]
pub fn fixture_registry() -> Registry {
    Registry::new()
        .register::<User>()
        .register::<Tag>()
        .register::<Post>()
        .register::<Comment>()
}

/// A database over a fresh in-memory store, with the default config.
///
/// The store is returned too, for inspecting documents and operation
/// counts.
#[must_use]
pub fn test_database() -> (Database, Arc<InMemoryStore>) {
    test_database_with(Config::default())
}

/// [`test_database`] with a custom config.
#[must_use]
pub fn test_database_with(config: Config) -> (Database, Arc<InMemoryStore>) {
    let store = Arc::new(InMemoryStore::new());
    let db = Database::open_with_config(store.clone(), fixture_registry(), config)
        .expect("fixture registry is valid");
    (db, store)
}

/// Saves `model` through its collection and returns the handle.
pub fn saved<M: Model>(db: &Database, model: M) -> Handle<M> {
    let handle = Handle::new(model);
    db.collection::<M>()
        .and_then(|c| c.save(&handle))
        .expect("fixture save succeeds");
    handle
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_round_trips() {
        let mut user = User::new("Alice", 30);
        user.email = Some("alice@example.com".into());
        user.tags = vec!["a".into(), "b".into()];
        let back = User::decode(&user.encode()).unwrap();
        assert_eq!(back, user);
    }

    #[test]
    fn user_schema_accepts_encoding() {
        let mut doc = User::new("Bob", 40).encode();
        doc.remove(ID_KEY);
        User::schema().check_partial(&doc).unwrap();
    }

    #[test]
    fn fixture_registry_is_valid() {
        fixture_registry().validate().unwrap();
    }
}
