#![allow(dead_code)]

use catalog_revisions::prelude::*;
use catalog_revisions::LiveEntityDescriptor;
use catalog_revisions::storage::TableSchema;

#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pub id: String,
    pub name: String,
    pub title: Option<String>,
    pub version: i64,
    pub state: State,
}

impl Dataset {
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            title: None,
            version: 1,
            state: State::Active,
        }
    }
}

impl Stateful for Dataset {
    fn state(&self) -> State {
        self.state
    }

    fn set_state(&mut self, state: State) {
        self.state = state;
    }
}

impl Versioned for Dataset {
    const TABLE: &'static str = "dataset";

    fn columns() -> Vec<Column> {
        vec![
            id_column(),
            Column::new("name", DataType::Text).not_null().unique(),
            Column::new("title", DataType::Text),
            Column::new("version", DataType::Integer).not_null(),
            state_column(),
        ]
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn to_row(&self) -> Row {
        vec![
            self.id.clone().into(),
            self.name.clone().into(),
            self.title.clone().into(),
            self.version.into(),
            self.state.into(),
        ]
    }

    fn from_row(row: &Row) -> Result<Self> {
        let reader = RowReader::new(Self::TABLE, row, 5)?;
        Ok(Self {
            id: reader.text(0)?,
            name: reader.text(1)?,
            title: reader.opt_text(2)?,
            version: reader.integer(3)?,
            state: reader.state(4)?,
        })
    }
}

impl AggregateRoot for Dataset {}

/// Link between a dataset and a tag.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetTag {
    pub id: String,
    pub dataset_id: Option<String>,
    pub tag: String,
    pub state: State,
}

impl DatasetTag {
    pub fn new(id: &str, dataset_id: &str, tag: &str) -> Self {
        Self {
            id: id.to_string(),
            dataset_id: Some(dataset_id.to_string()),
            tag: tag.to_string(),
            state: State::Active,
        }
    }
}

impl Stateful for DatasetTag {
    fn state(&self) -> State {
        self.state
    }

    fn set_state(&mut self, state: State) {
        self.state = state;
    }
}

impl Versioned for DatasetTag {
    const TABLE: &'static str = "dataset_tag";

    fn columns() -> Vec<Column> {
        vec![
            id_column(),
            Column::new("dataset_id", DataType::Text),
            Column::new("tag", DataType::Text).not_null(),
            state_column(),
        ]
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn to_row(&self) -> Row {
        vec![
            self.id.clone().into(),
            self.dataset_id.clone().into(),
            self.tag.clone().into(),
            self.state.into(),
        ]
    }

    fn from_row(row: &Row) -> Result<Self> {
        let reader = RowReader::new(Self::TABLE, row, 4)?;
        Ok(Self {
            id: reader.text(0)?,
            dataset_id: reader.opt_text(1)?,
            tag: reader.text(2)?,
            state: reader.state(3)?,
        })
    }
}

impl AggregateMember for DatasetTag {
    type Root = Dataset;

    fn root_id(&self) -> Option<String> {
        self.dataset_id.clone()
    }

    fn object_type() -> &'static str {
        "tag"
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    pub id: String,
    pub title: String,
    pub state: State,
}

impl Group {
    pub fn new(id: &str, title: &str) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            state: State::Active,
        }
    }
}

impl Stateful for Group {
    fn state(&self) -> State {
        self.state
    }

    fn set_state(&mut self, state: State) {
        self.state = state;
    }
}

impl Versioned for Group {
    const TABLE: &'static str = "catalog_group";

    fn columns() -> Vec<Column> {
        vec![
            id_column(),
            Column::new("title", DataType::Text).not_null(),
            state_column(),
        ]
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn to_row(&self) -> Row {
        vec![
            self.id.clone().into(),
            self.title.clone().into(),
            self.state.into(),
        ]
    }

    fn from_row(row: &Row) -> Result<Self> {
        let reader = RowReader::new(Self::TABLE, row, 3)?;
        Ok(Self {
            id: reader.text(0)?,
            title: reader.text(1)?,
            state: reader.state(2)?,
        })
    }
}

impl AggregateRoot for Group {
    fn object_type() -> &'static str {
        "group"
    }
}

/// Dataset-to-dataset relationship; versioned but audited by no aggregate.
#[derive(Debug, Clone, PartialEq)]
pub struct Relationship {
    pub id: String,
    pub subject_id: String,
    pub object_id: String,
    pub kind: String,
    pub state: State,
}

impl Stateful for Relationship {
    fn state(&self) -> State {
        self.state
    }

    fn set_state(&mut self, state: State) {
        self.state = state;
    }
}

impl Versioned for Relationship {
    const TABLE: &'static str = "relationship";

    fn columns() -> Vec<Column> {
        vec![
            id_column(),
            Column::new("subject_id", DataType::Text).not_null(),
            Column::new("object_id", DataType::Text).not_null(),
            Column::new("kind", DataType::Text).not_null(),
            state_column(),
        ]
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn to_row(&self) -> Row {
        vec![
            self.id.clone().into(),
            self.subject_id.clone().into(),
            self.object_id.clone().into(),
            self.kind.clone().into(),
            self.state.into(),
        ]
    }

    fn from_row(row: &Row) -> Result<Self> {
        let reader = RowReader::new(Self::TABLE, row, 5)?;
        Ok(Self {
            id: reader.text(0)?,
            subject_id: reader.text(1)?,
            object_id: reader.text(2)?,
            kind: reader.text(3)?,
            state: reader.state(4)?,
        })
    }
}

/// Resources are registered from a raw descriptor, bound by column.
pub fn resource_descriptor() -> LiveEntityDescriptor {
    LiveEntityDescriptor::new(
        "resource",
        vec![
            id_column(),
            Column::new("dataset_id", DataType::Text),
            Column::new("url", DataType::Text).not_null(),
            Column::new("size", DataType::Integer),
            state_column(),
        ],
    )
    .member_of("dataset", "dataset_id")
    .object_type("resource")
}

pub fn resource_row(id: &str, dataset_id: &str, url: &str) -> Row {
    vec![
        id.into(),
        dataset_id.into(),
        url.into(),
        Value::Null,
        State::Active.into(),
    ]
}

/// Survey root with a float score, registered from a descriptor.
pub fn survey_descriptor() -> LiveEntityDescriptor {
    LiveEntityDescriptor::new(
        "survey",
        vec![
            id_column(),
            Column::new("score", DataType::Float),
            state_column(),
        ],
    )
    .as_root()
}

pub fn survey_row(id: &str, score: f64) -> Row {
    vec![id.into(), score.into(), State::Active.into()]
}

pub fn survey_answer_descriptor() -> LiveEntityDescriptor {
    LiveEntityDescriptor::new(
        "survey_answer",
        vec![
            id_column(),
            Column::new("survey_id", DataType::Text),
            Column::new("answer", DataType::Text),
            state_column(),
        ],
    )
    .member_of("survey", "survey_id")
    .object_type("answer")
}

pub fn survey_answer_row(id: &str, survey_id: &str, answer: &str) -> Row {
    vec![
        id.into(),
        survey_id.into(),
        answer.into(),
        State::Active.into(),
    ]
}

/// Unversioned key/value settings.
pub fn setting_table() -> TableSchema {
    TableSchema::new(
        "setting",
        vec![
            Column::new("id", DataType::Text).primary_key(),
            Column::new("value", DataType::Text),
        ],
    )
}

pub fn catalog_schema() -> VersionedSchema {
    VersionedSchema::builder()
        .root::<Dataset>()
        .member::<DatasetTag>()
        .descriptor(resource_descriptor())
        .root::<Group>()
        .entity::<Relationship>()
        .descriptor(survey_descriptor())
        .descriptor(survey_answer_descriptor())
        .plain_table(setting_table())
        .build()
        .unwrap()
}

pub fn catalog_db() -> Database {
    Database::with_defaults(catalog_schema()).unwrap()
}

pub fn catalog_db_with(config: EngineConfig) -> Database {
    Database::open(catalog_schema(), config).unwrap()
}

/// Commits a new dataset with the given tags.
pub async fn create_dataset(db: &Database, id: &str, tags: &[(&str, &str)]) -> Dataset {
    let dataset = Dataset::new(id, id);
    let mut txn = db.begin();
    txn.insert_entity(&dataset).await.unwrap();
    for (tag_id, tag) in tags {
        txn.insert_entity(&DatasetTag::new(tag_id, id, tag))
            .await
            .unwrap();
    }
    txn.commit().await.unwrap();
    dataset
}
