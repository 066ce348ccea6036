pub mod core {
    pub mod document;
    pub mod identifiers;
}

pub mod execution {
    pub mod mutation;
    pub mod selection;
}

pub mod records {
    pub mod batch;
    pub mod outcome;
    pub mod report;
}
