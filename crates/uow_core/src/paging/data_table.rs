use super::Page;
use serde::Serialize;

/// Grid payload in the shape expected by DataTables-style front-ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DataTableResponse<'a, T> {
    /// Request counter echoed back to the grid.
    pub draw: u64,
    pub records_total: usize,
    pub records_filtered: usize,
    pub data: &'a [T],
}

impl<T> Page<T> {
    pub fn to_data_table(&self, draw: u64) -> DataTableResponse<'_, T> {
        DataTableResponse {
            draw,
            records_total: self.count(),
            records_filtered: self.filtered(),
            data: self.items(),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::paging::{paginate, PageRequest};

    #[test]
    fn data_table_uses_grid_field_names() {
        let rows = vec!["a", "b", "c"];
        let page = paginate(&rows, PageRequest::new(0, 2), 10).expect("page");
        let json = serde_json::to_value(page.to_data_table(4)).expect("response should serialize");

        assert_eq!(
            json,
            serde_json::json!({
                "draw": 4,
                "recordsTotal": 10,
                "recordsFiltered": 3,
                "data": ["a", "b"],
            })
        );
    }
}
