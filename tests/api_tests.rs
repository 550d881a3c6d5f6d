//! End-to-end tests: compiled schema executed against a seeded in-memory store.

use std::sync::Arc;

use bson::oid::ObjectId;
use familiar_graphql::ids::to_global_id;
use familiar_graphql::{ApiError, GraphqlApi, MemoryStorage, Project, RequestContext};
use serde_json::{json, Value};

const USER_1: &str = "5a0d3ae7b3e6f1d4d8a6b201";
const USER_2: &str = "5a0d3ae7b3e6f1d4d8a6b202";
const USER_3: &str = "5a0d3ae7b3e6f1d4d8a6b203";
const USER_4: &str = "5a0d3ae7b3e6f1d4d8a6b204";
const NEWS_1: &str = "5a0d3ae7b3e6f1d4d8a6b2a1";
const NEWS_GHOST: &str = "5a0d3ae7b3e6f1d4d8a6b2a2";
const AVATAR: &str = "5a0d3ae7b3e6f1d4d8a6b2f1";
const MISSING: &str = "5a0d3ae7b3e6f1d4d8a6b2ff";

fn project() -> Project {
    let value: Value = serde_json::from_str(include_str!("fixtures/project.json")).unwrap();
    Project::from_json(value).unwrap()
}

async fn storage() -> Arc<MemoryStorage> {
    let fixture: Value = serde_json::from_str(include_str!("fixtures/data.json")).unwrap();
    let storage = MemoryStorage::new();
    storage.seed(&fixture).await.unwrap();
    Arc::new(storage)
}

struct Harness {
    api: GraphqlApi,
    project: Project,
    storage: Arc<MemoryStorage>,
}

impl Harness {
    async fn new() -> Self {
        Self {
            api: GraphqlApi::new(),
            project: project(),
            storage: storage().await,
        }
    }

    async fn run(&self, query: &str, allow_mutation: bool) -> Value {
        let response = self
            .api
            .execute(
                &self.project,
                self.storage.clone(),
                query,
                RequestContext { allow_mutation },
            )
            .await
            .unwrap();
        serde_json::to_value(&response).unwrap()
    }

    async fn query(&self, query: &str) -> Value {
        self.run(query, false).await
    }

    async fn mutate(&self, query: &str) -> Value {
        self.run(query, true).await
    }
}

fn errors(response: &Value) -> Vec<String> {
    response["errors"]
        .as_array()
        .map(|errors| {
            errors
                .iter()
                .map(|e| e["message"].as_str().unwrap_or_default().to_string())
                .collect()
        })
        .unwrap_or_default()
}

fn names(connection: &Value) -> Vec<String> {
    connection["edges"]
        .as_array()
        .unwrap()
        .iter()
        .map(|edge| edge["node"]["name"].as_str().unwrap().to_string())
        .collect()
}

// =============================================================================
// Single queries
// =============================================================================

#[tokio::test]
async fn test_single_query_by_mongo_id() {
    let h = Harness::new().await;
    let response = h
        .query(&format!(
            r#"{{ user(id: "{}") {{ id mongoId name vip age popularity dynamic _className _classVersion avatar {{ filename }} }} }}"#,
            USER_1
        ))
        .await;

    assert!(errors(&response).is_empty(), "{:?}", response);
    let user = &response["data"]["user"];
    assert_eq!(user["id"], json!(to_global_id("User", USER_1)));
    assert_eq!(user["mongoId"], json!(USER_1));
    assert_eq!(user["name"], json!("User 1"));
    assert_eq!(user["vip"], json!(true));
    assert_eq!(user["age"], json!(18));
    assert_eq!(user["popularity"], json!(1.5));
    assert_eq!(user["dynamic"], json!({"key": "value"}));
    assert_eq!(user["_className"], json!("User"));
    assert_eq!(user["_classVersion"], json!(0));
    assert_eq!(user["avatar"]["filename"], json!("avatar.png"));
}

#[tokio::test]
async fn test_single_query_by_global_id_and_by_field() {
    let h = Harness::new().await;

    let global = to_global_id("User", USER_2);
    let response = h.query(&format!(r#"{{ user(id: "{}") {{ name }} }}"#, global)).await;
    assert_eq!(response["data"]["user"]["name"], json!("User 2"));

    let response = h.query(r#"{ user(name: "User 3") { mongoId age } }"#).await;
    assert_eq!(response["data"]["user"]["mongoId"], json!(USER_3));
    assert_eq!(response["data"]["user"]["age"], json!(42));
}

#[tokio::test]
async fn test_single_query_removed_and_missing() {
    let h = Harness::new().await;

    let response = h.query(&format!(r#"{{ user(id: "{}") {{ name }} }}"#, USER_4)).await;
    assert_eq!(response["data"]["user"], Value::Null);
    assert_eq!(errors(&response), vec!["Object \"User\" marked as removed"]);

    let response = h.query(&format!(r#"{{ user(id: "{}") {{ name }} }}"#, MISSING)).await;
    assert_eq!(response["data"]["user"], Value::Null);
    assert_eq!(errors(&response), vec!["Object \"User\" not found"]);
}

#[tokio::test]
async fn test_missing_relation_resolves_to_null_with_one_error() {
    let h = Harness::new().await;
    let response = h
        .query(&format!(r#"{{ news(id: "{}") {{ title author {{ name }} }} }}"#, NEWS_GHOST))
        .await;

    assert_eq!(response["data"]["news"]["title"], json!("Ghost"));
    assert_eq!(response["data"]["news"]["author"], Value::Null);
    assert_eq!(errors(&response), vec!["Object \"User\" not found"]);
}

#[tokio::test]
async fn test_missing_file_relation() {
    let h = Harness::new().await;
    let response = h
        .query(&format!(r#"{{ user(id: "{}") {{ name avatar {{ filename }} }} }}"#, USER_3))
        .await;
    assert_eq!(response["data"]["user"]["name"], json!("User 3"));
    assert_eq!(response["data"]["user"]["avatar"], Value::Null);
    assert_eq!(errors(&response), vec!["File not found"]);
}

#[tokio::test]
async fn test_raw_query() {
    let h = Harness::new().await;
    let response = h.query(&format!(r#"{{ userRaw(id: "{}") }}"#, USER_1)).await;
    let raw = &response["data"]["userRaw"];
    assert_eq!(raw["name"], json!("User 1"));
    assert_eq!(raw["mongoId"], json!(USER_1));
    assert_eq!(raw["avatar"], json!(AVATAR));
    assert!(raw.get("_className").is_none());
}

// =============================================================================
// List queries
// =============================================================================

#[tokio::test]
async fn test_list_query_skips_removed_records() {
    let h = Harness::new().await;
    let response = h.query("{ users { totalCount edges { node { name } } } }").await;
    let users = &response["data"]["users"];
    assert_eq!(users["totalCount"], json!(3));
    assert_eq!(names(users), vec!["User 1", "User 2", "User 3"]);
}

#[tokio::test]
async fn test_list_numeric_filters() {
    let h = Harness::new().await;
    let response = h
        .query("{ users(filters: {age: {lt: 42, gte: 18}}) { totalCount edges { node { name } } } }")
        .await;
    let users = &response["data"]["users"];
    assert_eq!(users["totalCount"], json!(2));
    assert_eq!(names(users), vec!["User 1", "User 2"]);

    let response = h
        .query("{ users(filters: {age: {lt: 41.5}, popularity: {gte: 1}}) { edges { node { name } } } }")
        .await;
    assert!(errors(&response).is_empty(), "{:?}", response);
    assert_eq!(names(&response["data"]["users"]), vec!["User 1", "User 2"]);
}

#[tokio::test]
async fn test_list_in_and_eq_filters() {
    let h = Harness::new().await;

    let response = h
        .query(r#"{ users(filters: {name: {in: ["User 1", "User 3"]}}) { edges { node { name } } } }"#)
        .await;
    assert_eq!(names(&response["data"]["users"]), vec!["User 1", "User 3"]);

    let response = h
        .query("{ users(filters: {vip: {eq: false}}) { edges { node { name } } } }")
        .await;
    assert_eq!(names(&response["data"]["users"]), vec!["User 2", "User 3"]);
}

#[tokio::test]
async fn test_list_regexp_filter() {
    let h = Harness::new().await;
    let response = h
        .query(r#"{ users(filters: {name: {regexp: "/^user [12]$/i"}}) { edges { node { name } } } }"#)
        .await;
    assert!(errors(&response).is_empty(), "{:?}", response);
    assert_eq!(names(&response["data"]["users"]), vec!["User 1", "User 2"]);
}

#[tokio::test]
async fn test_list_malformed_regexp() {
    let h = Harness::new().await;
    let response = h
        .query(r#"{ users(filters: {name: {regexp: "^User"}}) { totalCount } }"#)
        .await;
    assert_eq!(response["data"]["users"], Value::Null);
    assert_eq!(errors(&response), vec!["Invalid RegExp at User/name"]);

    // well-shaped literal the in-memory store cannot compile
    let response = h
        .query(r#"{ users(filters: {name: {regexp: "/^(?!User 2)/"}}) { totalCount } }"#)
        .await;
    assert_eq!(response["data"]["users"], Value::Null);
    let errors = errors(&response);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].starts_with("Invalid regular expression /^(?!User 2)/"), "{:?}", errors);
}

#[tokio::test]
async fn test_list_relation_filter() {
    let h = Harness::new().await;
    let response = h
        .query(&format!(
            r#"{{ newsItems(filters: {{author: {{eq: "{}"}}}}) {{ totalCount edges {{ node {{ title }} }} }} }}"#,
            to_global_id("User", USER_1)
        ))
        .await;
    let news = &response["data"]["newsItems"];
    assert_eq!(news["totalCount"], json!(1));
    assert_eq!(news["edges"][0]["node"]["title"], json!("Hello"));
}

#[tokio::test]
async fn test_list_sort() {
    let h = Harness::new().await;
    let response = h.query("{ users(orderBy: [NAME_DESC]) { edges { node { name } } } }").await;
    assert_eq!(names(&response["data"]["users"]), vec!["User 3", "User 2", "User 1"]);
}

#[tokio::test]
async fn test_list_pagination() {
    let h = Harness::new().await;
    let response = h
        .query("{ users(first: 2, orderBy: [NAME_ASC]) { totalCount pageInfo { hasNextPage endCursor } edges { cursor node { name } } } }")
        .await;
    let users = &response["data"]["users"];
    assert_eq!(users["totalCount"], json!(3));
    assert_eq!(names(users), vec!["User 1", "User 2"]);
    assert_eq!(users["pageInfo"]["hasNextPage"], json!(true));

    let cursor = users["pageInfo"]["endCursor"].as_str().unwrap();
    assert_eq!(users["edges"][1]["cursor"], json!(cursor));

    let response = h
        .query(&format!(
            r#"{{ users(first: 2, after: "{}", orderBy: [NAME_ASC]) {{ pageInfo {{ hasNextPage }} edges {{ node {{ name }} }} }} }}"#,
            cursor
        ))
        .await;
    let users = &response["data"]["users"];
    assert_eq!(names(users), vec!["User 3"]);
    assert_eq!(users["pageInfo"]["hasNextPage"], json!(false));
}

#[tokio::test]
async fn test_relation_list_connection() {
    let h = Harness::new().await;
    let response = h
        .query(&format!(
            r#"{{ news(id: "{}") {{
                arrayOfString1
                comments(first: 1) {{ totalCount pageInfo {{ hasNextPage }} edges {{ node {{ body author {{ name }} }} }} }}
                files {{ edges {{ node {{ filename }} }} }}
            }} }}"#,
            NEWS_1
        ))
        .await;

    assert!(errors(&response).is_empty(), "{:?}", response);
    let news = &response["data"]["news"];
    assert_eq!(news["arrayOfString1"], json!(["a", "b"]));
    assert_eq!(news["comments"]["totalCount"], json!(2));
    assert_eq!(news["comments"]["pageInfo"]["hasNextPage"], json!(true));
    assert_eq!(news["comments"]["edges"][0]["node"]["body"], json!("First"));
    assert_eq!(news["comments"]["edges"][0]["node"]["author"]["name"], json!("User 1"));
    assert_eq!(news["files"]["edges"][0]["node"]["filename"], json!("avatar.png"));
}

// =============================================================================
// Mutations
// =============================================================================

#[tokio::test]
async fn test_mutations_require_capability() {
    let h = Harness::new().await;
    let response = h
        .query(r#"mutation { createUser(input: {name: "Nope"}) { createdUser { id } } }"#)
        .await;
    assert_eq!(response["data"]["createUser"], Value::Null);
    assert_eq!(errors(&response), vec!["Usage of \"createUser\" mutation is not allowed"]);
    assert_eq!(h.storage.collection("user").len().await, 4);
}

#[tokio::test]
async fn test_every_mutation_requires_capability() {
    let h = Harness::new().await;
    let before = h.storage.collection("user").get(ObjectId::parse_str(USER_2).unwrap()).await.unwrap();

    let mutations = [
        ("createUser", r#"createUser(input: {name: "Nope"}) { createdUser { id } }"#.to_string()),
        (
            "updateUser",
            format!(r#"updateUser(input: {{id: "{}", age: 99}}) {{ updatedUser {{ id }} }}"#, USER_2),
        ),
        (
            "replaceUser",
            format!(r#"replaceUser(input: {{id: "{}", name: "Nope"}}) {{ replacedUser {{ id }} }}"#, USER_2),
        ),
        ("removeUser", format!(r#"removeUser(input: {{id: "{}"}}) {{ removedUserId }}"#, USER_2)),
        ("recoverUser", format!(r#"recoverUser(input: {{id: "{}"}}) {{ recoveredUser {{ id }} }}"#, USER_4)),
    ];

    for (name, selection) in mutations {
        let response = h.query(&format!("mutation {{ {} }}", selection)).await;
        assert_eq!(response["data"][name], Value::Null, "{}", name);
        assert_eq!(
            errors(&response),
            vec![format!("Usage of \"{}\" mutation is not allowed", name)]
        );
    }

    let users = h.storage.collection("user");
    assert_eq!(users.len().await, 4);
    assert_eq!(users.get(ObjectId::parse_str(USER_2).unwrap()).await.unwrap(), before);
    let removed = users.get(ObjectId::parse_str(USER_4).unwrap()).await.unwrap();
    assert_eq!(removed.get_bool("_deleted").unwrap(), true);

    let response = h
        .query(&format!(r#"{{ user(id: "{}") {{ name age _classVersion }} }}"#, USER_2))
        .await;
    assert_eq!(
        response["data"]["user"],
        json!({"name": "User 2", "age": 30, "_classVersion": 0})
    );
}

#[tokio::test]
async fn test_create() {
    let h = Harness::new().await;
    let response = h
        .mutate(&format!(
            r#"mutation {{ createUser(input: {{
                clientMutationId: "m1", name: "User 5", age: 25, dynamic: "{{\"a\": [1, 2]}}", avatar: "{}"
            }}) {{
                clientMutationId
                createdUser {{ name age dynamic _classVersion avatar {{ filename }} }}
                users {{ totalCount }}
            }} }}"#,
            AVATAR
        ))
        .await;

    assert!(errors(&response).is_empty(), "{:?}", response);
    let payload = &response["data"]["createUser"];
    assert_eq!(payload["clientMutationId"], json!("m1"));
    assert_eq!(payload["createdUser"]["name"], json!("User 5"));
    assert_eq!(payload["createdUser"]["dynamic"], json!({"a": [1, 2]}));
    assert_eq!(payload["createdUser"]["_classVersion"], json!(2));
    assert_eq!(payload["createdUser"]["avatar"]["filename"], json!("avatar.png"));
    assert_eq!(payload["users"]["totalCount"], json!(4));
}

#[tokio::test]
async fn test_create_with_missing_reference() {
    let h = Harness::new().await;
    let response = h
        .mutate(&format!(
            r#"mutation {{ createComment(input: {{body: "x", author: "{}"}}) {{ createdComment {{ id }} }} }}"#,
            MISSING
        ))
        .await;
    assert_eq!(response["data"]["createComment"], Value::Null);
    assert_eq!(
        errors(&response),
        vec![format!("There is no \"User\" with id \"{}\" !", MISSING)]
    );
    assert_eq!(h.storage.collection("comment").len().await, 2);
}

#[tokio::test]
async fn test_update_keeps_other_fields() {
    let h = Harness::new().await;
    let response = h
        .mutate(&format!(
            r#"mutation {{ updateUser(input: {{id: "{}", age: 31}}) {{ updatedUser {{ name age _classVersion }} }} }}"#,
            to_global_id("User", USER_2)
        ))
        .await;
    let user = &response["data"]["updateUser"]["updatedUser"];
    assert_eq!(user["name"], json!("User 2"));
    assert_eq!(user["age"], json!(31));
    assert_eq!(user["_classVersion"], json!(2));
}

#[tokio::test]
async fn test_replace_and_upsert() {
    let h = Harness::new().await;
    let response = h
        .mutate(&format!(
            r#"mutation {{ replaceUser(input: {{id: "{}", name: "Replaced"}}) {{ replacedUser {{ mongoId name age }} }} }}"#,
            USER_2
        ))
        .await;
    let user = &response["data"]["replaceUser"]["replacedUser"];
    assert_eq!(user["mongoId"], json!(USER_2));
    assert_eq!(user["name"], json!("Replaced"));
    assert_eq!(user["age"], Value::Null);

    let response = h
        .mutate(r#"mutation { replaceUser(input: {name: "Fresh"}) { replacedUser { name } users { totalCount } } }"#)
        .await;
    assert!(errors(&response).is_empty(), "{:?}", response);
    assert_eq!(response["data"]["replaceUser"]["replacedUser"]["name"], json!("Fresh"));
    assert_eq!(response["data"]["replaceUser"]["users"]["totalCount"], json!(4));
}

#[tokio::test]
async fn test_remove_and_recover() {
    let h = Harness::new().await;
    let remove = format!(
        r#"mutation {{ removeUser(input: {{id: "{}"}}) {{ removedUserId }} }}"#,
        USER_1
    );

    let response = h.mutate(&remove).await;
    assert_eq!(response["data"]["removeUser"]["removedUserId"], json!(USER_1));

    let response = h.query(&format!(r#"{{ user(id: "{}") {{ name }} }}"#, USER_1)).await;
    assert_eq!(errors(&response), vec!["Object \"User\" marked as removed"]);

    let response = h.mutate(&remove).await;
    assert!(errors(&response).is_empty(), "{:?}", response);
    assert_eq!(response["data"]["removeUser"]["removedUserId"], json!(USER_1));

    let response = h
        .mutate(&format!(
            r#"mutation {{ recoverUser(input: {{id: "{}"}}) {{ recoveredUser {{ name }} }} }}"#,
            USER_1
        ))
        .await;
    assert_eq!(response["data"]["recoverUser"]["recoveredUser"]["name"], json!("User 1"));

    let response = h
        .mutate(&format!(
            r#"mutation {{ recoverUser(input: {{id: "{}"}}) {{ recoveredUser {{ name }} }} }}"#,
            MISSING
        ))
        .await;
    assert_eq!(errors(&response), vec!["Object \"User\" not found"]);
}

// =============================================================================
// Files, nodes and project
// =============================================================================

#[tokio::test]
async fn test_file_query() {
    let h = Harness::new().await;
    let response = h
        .query(&format!(r#"{{ file(id: "{}") {{ id filename contentType length }} }}"#, AVATAR))
        .await;
    let file = &response["data"]["file"];
    assert_eq!(file["id"], json!(to_global_id("File", AVATAR)));
    assert_eq!(file["filename"], json!("avatar.png"));
    assert_eq!(file["contentType"], json!("image/png"));
    assert_eq!(file["length"], json!(1024));

    let response = h.query(&format!(r#"{{ file(id: "{}") {{ filename }} }}"#, MISSING)).await;
    assert_eq!(response["data"]["file"], Value::Null);
    assert_eq!(errors(&response), vec!["File not found"]);
}

#[tokio::test]
async fn test_node_query() {
    let h = Harness::new().await;
    let response = h
        .query(&format!(
            r#"{{
                user: node(id: "{}") {{ id ... on User {{ name }} }}
                file: node(id: "{}") {{ id ... on File {{ filename }} }}
            }}"#,
            to_global_id("User", USER_1),
            to_global_id("File", AVATAR)
        ))
        .await;
    assert!(errors(&response).is_empty(), "{:?}", response);
    assert_eq!(response["data"]["user"]["name"], json!("User 1"));
    assert_eq!(response["data"]["file"]["filename"], json!("avatar.png"));

    let response = h
        .query(&format!(r#"{{ node(id: "{}") {{ id }} }}"#, to_global_id("Ghost", USER_1)))
        .await;
    assert_eq!(errors(&response), vec!["Unknown class \"Ghost\""]);
}

#[tokio::test]
async fn test_project_query() {
    let h = Harness::new().await;
    let response = h
        .query("{ _project { name shortName uniqueName classes { version } } }")
        .await;
    let project = &response["data"]["_project"];
    assert_eq!(project["name"], json!("Demo"));
    assert_eq!(project["shortName"], json!("demo"));
    assert_eq!(project["uniqueName"], json!("demo-5a0d3ae7"));
    assert_eq!(project["classes"]["version"], json!(2));
}

// =============================================================================
// Schema cache
// =============================================================================

#[tokio::test]
async fn test_schema_cache_hit_and_rebuild() {
    let h = Harness::new().await;
    h.query("{ users { totalCount } }").await;
    h.query("{ users { totalCount } }").await;
    assert_eq!(h.api.cache().len().await, 1);

    let first = h.api.schema_for(&h.project).await.unwrap();
    let again = h.api.schema_for(&h.project).await.unwrap();
    assert!(Arc::ptr_eq(&first, &again));

    let mut changed = h.project.clone();
    if let Some(classes) = changed.classes.as_mut() {
        classes.definitions["Tag"] = json!({"label": "string"});
    }
    let rebuilt = h.api.schema_for(&changed).await.unwrap();
    assert!(!Arc::ptr_eq(&first, &rebuilt));
    assert_eq!(rebuilt.class_count, 4);
    assert!(rebuilt.sdl().contains("type Tag implements Node"));
    assert_eq!(h.api.cache().len().await, 1);
}

#[tokio::test]
async fn test_definition_errors_fail_the_request() {
    let h = Harness::new().await;
    let mut broken = h.project.clone();
    if let Some(classes) = broken.classes.as_mut() {
        classes.definitions["News"] = json!({"author": {"type": "relation", "ref": "nobody"}});
    }

    let result = h
        .api
        .execute(&broken, h.storage.clone(), "{ users { totalCount } }", RequestContext::default())
        .await;
    match result {
        Err(ApiError::Definition(e)) => {
            assert_eq!(e.to_string(), "Parse error: Found a reference to missing class \"nobody\"");
        }
        other => panic!("expected a definition error, got {:?}", other.map(|_| ())),
    }
}
