use rusqlite::types::Value as DbValue;

#[derive(Debug, Clone)]
pub enum Value {
    Text(String),
    Integer(u64),
    Bool(bool),
    Null,
}

impl From<Value> for DbValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Text(text) => DbValue::Text(text),
            Value::Integer(integer) => DbValue::Integer(integer as i64),
            Value::Bool(boolean) => DbValue::Integer(boolean as i64),
            Value::Null => DbValue::Null,
        }
    }
}

pub fn convert_values(values: Vec<Value>) -> Vec<DbValue> {
    values.into_iter().map(DbValue::from).collect()
}

pub struct Select {
    fields: &'static [&'static str],
    table: &'static str,

    wheres: Vec<String>,
    order_by: Vec<&'static str>,
    values: Vec<Value>,
}

impl Select {
    pub fn new(fields: &'static [&'static str], table: &'static str) -> Self {
        Self {
            fields,
            table,
            wheres: Vec::new(),
            order_by: Vec::new(),
            values: Vec::new(),
        }
    }

    pub fn add_order_by(&mut self, s: &'static str) {
        self.order_by.push(s);
    }

    pub fn add_where(&mut self, s: impl ToString, value: Value) {
        self.wheres.push(s.to_string());
        self.values.push(value);
    }

    /// Adds `field IN (?, ?, ...)`. An empty list matches nothing.
    pub fn add_where_in(&mut self, field: &str, values: Vec<Value>) {
        if values.is_empty() {
            self.wheres.push(String::from("1 = 0"));
            return;
        }
        let marks = vec!["?"; values.len()].join(", ");
        self.wheres.push(format!("{field} IN ({marks})"));
        self.values.extend(values);
    }

    pub fn build(self) -> (String, Vec<DbValue>) {
        let mut sql = format!("SELECT {} FROM {}", self.fields.join(", "), self.table);

        if !self.wheres.is_empty() {
            let where_clause = self.wheres.join(" AND ");
            sql.push_str(&format!(" WHERE {}", where_clause));
        }

        if !self.order_by.is_empty() {
            let order_by = self.order_by.join(", ");
            sql.push_str(&format!(" ORDER BY {}", order_by));
        }

        (sql, convert_values(self.values))
    }
}

pub struct Update {
    table: &'static str,

    fields: Vec<&'static str>,
    wheres: Vec<String>,
    values: Vec<Value>,
    where_values: Vec<Value>,
}

impl Update {
    pub fn new(table: &'static str) -> Self {
        Self {
            table,
            fields: Vec::new(),
            wheres: Vec::new(),
            values: Vec::new(),
            where_values: Vec::new(),
        }
    }

    pub fn add_field(&mut self, field: &'static str, value: Value) {
        self.fields.push(field);
        self.values.push(value);
    }

    pub fn add_where(&mut self, s: impl ToString, value: Value) {
        self.wheres.push(s.to_string());
        self.where_values.push(value);
    }

    pub fn build(mut self) -> (String, Vec<DbValue>) {
        if self.fields.is_empty() {
            return (String::new(), Vec::new());
        }
        let mut sql = format!("UPDATE {} SET ", self.table);
        let set = self
            .fields
            .iter()
            .map(|f| format!("{} = ?", f))
            .collect::<Vec<_>>()
            .join(", ");
        sql.push_str(&set);

        if !self.wheres.is_empty() {
            let where_clause = self.wheres.join(" AND ");
            sql.push_str(&format!(" WHERE {}", where_clause));
        }

        self.values.append(&mut self.where_values);
        (sql, convert_values(self.values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select() {
        let mut select = Select::new(&["user", "name"], "entity");
        select.add_where("name = ?", Value::Text(String::from("wordpress")));
        select.add_where_in(
            "user",
            vec![
                Value::Text(String::from("bob")),
                Value::Text(String::from("alice")),
            ],
        );
        select.add_order_by("revision DESC");
        let (sql, values) = select.build();
        assert_eq!(
            sql,
            "SELECT user, name FROM entity WHERE name = ? AND user IN (?, ?) ORDER BY revision DESC"
        );
        assert_eq!(values.len(), 3);

        let mut select = Select::new(&["user"], "entity");
        select.add_where_in("name", vec![]);
        let (sql, values) = select.build();
        assert_eq!(sql, "SELECT user FROM entity WHERE 1 = 0");
        assert!(values.is_empty());
    }

    #[test]
    fn test_update() {
        let mut update = Update::new("entity");
        update.add_where("user = ?", Value::Text(String::from("bob")));
        update.add_field("stable", Value::Bool(true));
        update.add_field("promulgated_revision", Value::Null);
        let (sql, values) = update.build();
        assert_eq!(
            sql,
            "UPDATE entity SET stable = ?, promulgated_revision = ? WHERE user = ?"
        );
        assert_eq!(values[0], DbValue::Integer(1));
        assert_eq!(values[1], DbValue::Null);
        assert_eq!(values[2], DbValue::Text(String::from("bob")));

        let (sql, _) = Update::new("entity").build();
        assert!(sql.is_empty());
    }
}
