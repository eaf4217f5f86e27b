use crate::value::Value;

/// Terminal state of a record for the current pipeline pass.
///
/// `Error` and `Filtered` are sticky: once set, no further stage in the
/// current map/filter group runs for that record and the status is never
/// reverted within the pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Valid,
    Error,
    Filtered,
}

/// One unit of data flowing through the pipeline.
#[derive(Debug, Clone)]
pub struct Record {
    /// The original input text this record was constructed from, kept for
    /// diagnostics. Synthesized records (collect/push results) carry a
    /// placeholder.
    pub init: String,
    pub value: Value,
    pub status: Status,
    /// Present iff `status != Valid`.
    pub diagnostic: Option<String>,
}

impl Record {
    pub fn new(init: impl Into<String>, value: Value) -> Self {
        Self {
            init: init.into(),
            value,
            status: Status::Valid,
            diagnostic: None,
        }
    }

    /// A record not traceable to a single input token.
    pub fn synthetic(value: Value) -> Self {
        Record::new("<derived>", value)
    }

    pub fn is_valid(&self) -> bool {
        self.status == Status::Valid
    }

    /// Marks the record as errored. The first failure wins; later calls on
    /// an already-terminal record are ignored.
    pub fn fail(&mut self, diagnostic: String) {
        if self.status == Status::Valid {
            self.status = Status::Error;
            self.diagnostic = Some(diagnostic);
        }
    }

    /// Marks the record as filtered out.
    pub fn filter_out(&mut self, diagnostic: String) {
        if self.status == Status::Valid {
            self.status = Status::Filtered;
            self.diagnostic = Some(diagnostic);
        }
    }
}
