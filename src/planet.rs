mod provider;
pub use provider::Provider;

/// Wire shapes of the Data and Orders API responses this crate reads.
mod responses {
    use crate::catalog::SceneRecord;
    use serde::Deserialize;
    use std::fmt;
    use url::Url;

    /// One page of a quick search.
    #[derive(Deserialize, Debug)]
    pub struct SearchPage {
        #[serde(default)]
        pub features: Vec<SceneRecord>,
        #[serde(rename = "_links", default)]
        pub links: PageLinks,
    }

    #[derive(Deserialize, Debug, Default)]
    pub struct PageLinks {
        #[serde(rename = "_next")]
        pub next: Option<Url>,
    }

    #[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
    #[serde(rename_all = "lowercase")]
    pub enum OrderState {
        Queued,
        Running,
        Success,
        Partial,
        Failed,
        Cancelled,
        #[serde(other)]
        Unknown,
    }

    impl OrderState {
        pub fn as_str(&self) -> &'static str {
            match self {
                Self::Queued => "queued",
                Self::Running => "running",
                Self::Success => "success",
                Self::Partial => "partial",
                Self::Failed => "failed",
                Self::Cancelled => "cancelled",
                Self::Unknown => "unknown",
            }
        }
    }

    impl fmt::Display for OrderState {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(self.as_str())
        }
    }

    #[derive(Deserialize, Debug)]
    pub struct OrderStatus {
        pub id: String,
        pub state: OrderState,
        #[serde(rename = "_links", default)]
        pub links: OrderLinks,
    }

    #[derive(Deserialize, Debug, Default)]
    pub struct OrderLinks {
        #[serde(default)]
        pub results: Vec<ResultLink>,
    }

    /// A deliverable file. `name` is a relative path such as
    /// `<order id>/<file>.zip`.
    #[derive(Deserialize, Clone, Debug)]
    pub struct ResultLink {
        pub name: String,
        pub location: Url,
    }

}
