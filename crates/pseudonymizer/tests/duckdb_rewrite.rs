//! End-to-end rewrites against in-memory DuckDB databases.

use std::net::Ipv4Addr;

use pseudonymizer::{
    ColumnType, DataSourceRegistry, DatabaseDescriptor, DatabaseOutcome, DuckDbDataSource,
    EntryOutcome, Executor, Identity, IdentityRequest, PseudonymSettings, QueryCatalog,
    RewriteScenario, SkipReason, TableEntryDescriptor,
};

const DB: &str = "WSO2AM_STATS_DB";

struct Fixture {
    registry: DataSourceRegistry,
    raw: duckdb::Connection,
}

impl Fixture {
    fn new(setup: &str) -> Self {
        let source = DuckDbDataSource::in_memory(DB).unwrap();
        source.execute_batch(setup).unwrap();
        let raw = source.raw_connection().unwrap();
        let mut registry = DataSourceRegistry::new();
        registry.register(source);
        Self { registry, raw }
    }

    fn run(&self, identity: &Identity, tables: Vec<TableEntryDescriptor>) -> pseudonymizer::RunReport {
        let databases = vec![DatabaseDescriptor::new(DB, tables)];
        Executor::new(identity, &self.registry, &databases).run().unwrap()
    }

    fn strings(&self, sql: &str) -> Vec<String> {
        let mut stmt = self.raw.prepare(sql).unwrap();
        stmt.query_map([], |row| row.get::<_, String>(0))
            .unwrap()
            .map(Result::unwrap)
            .collect()
    }
}

fn identity(request: IdentityRequest) -> Identity {
    Identity::resolve(request, &PseudonymSettings::default()).unwrap()
}

fn admin() -> Identity {
    identity(IdentityRequest::new("admin").with_pseudonym("anon1"))
}

#[test]
fn bare_super_tenant_username_is_replaced() {
    let fixture = Fixture::new(
        "CREATE TABLE API_REQUEST_SUMMARY (USER_ID VARCHAR);
         INSERT INTO API_REQUEST_SUMMARY VALUES ('admin'), ('admin@carbon.super'), ('bob');",
    );

    let report = fixture.run(
        &admin(),
        vec![TableEntryDescriptor::new("API_REQUEST_SUMMARY", "USER_ID")],
    );

    assert_eq!(report.rows_rewritten(), 1);
    assert_eq!(
        fixture.strings("SELECT USER_ID FROM API_REQUEST_SUMMARY ORDER BY USER_ID"),
        vec!["admin@carbon.super", "anon1", "bob"]
    );
}

#[test]
fn qualified_super_tenant_username_is_replaced() {
    let fixture = Fixture::new(
        "CREATE TABLE API_REQUEST_SUMMARY (USER_ID VARCHAR);
         INSERT INTO API_REQUEST_SUMMARY VALUES ('admin'), ('admin@carbon.super');",
    );

    fixture.run(
        &admin(),
        vec![TableEntryDescriptor::new("API_REQUEST_SUMMARY", "USER_ID").with_super_tenant_domain(true)],
    );

    assert_eq!(
        fixture.strings("SELECT USER_ID FROM API_REQUEST_SUMMARY ORDER BY USER_ID"),
        vec!["admin", "anon1@carbon.super"]
    );
}

#[test]
fn tenant_username_in_text_is_replaced() {
    let fixture = Fixture::new(
        "CREATE TABLE ALERT_LOG (MESSAGE VARCHAR);
         INSERT INTO ALERT_LOG VALUES
            ('throttled user=alice@wso2.com; api=pizza'),
            ('throttled user=alice@wso2.community; api=pizza');",
    );
    let alice = identity(
        IdentityRequest::new("alice")
            .with_pseudonym("p1")
            .with_tenant_domain("wso2.com"),
    );

    let report = fixture.run(
        &alice,
        vec![TableEntryDescriptor::new("ALERT_LOG", "MESSAGE").with_text_replace("user=", ";")],
    );

    assert_eq!(report.rows_rewritten(), 1);
    assert_eq!(
        fixture.strings("SELECT MESSAGE FROM ALERT_LOG ORDER BY MESSAGE"),
        vec![
            "throttled user=alice@wso2.community; api=pizza",
            "throttled user=p1@wso2.com; api=pizza",
        ]
    );
}

#[test]
fn email_rule_without_email_runs_nothing() {
    let fixture = Fixture::new(
        "CREATE TABLE SUBSCRIBERS (EMAILS VARCHAR);
         INSERT INTO SUBSCRIBERS VALUES ('a@x.com,admin@x.com');",
    );

    let report = fixture.run(
        &admin(),
        vec![
            TableEntryDescriptor::new("SUBSCRIBERS", "EMAILS")
                .with_column_type(ColumnType::Email)
                .with_text_replace("", ","),
        ],
    );

    assert_eq!(
        report.databases[0].entries[0].outcome,
        EntryOutcome::Skipped {
            reason: SkipReason::MissingEmail
        }
    );
    assert_eq!(
        fixture.strings("SELECT EMAILS FROM SUBSCRIBERS"),
        vec!["a@x.com,admin@x.com"]
    );
}

#[test]
fn email_in_list_is_replaced() {
    let fixture = Fixture::new(
        "CREATE TABLE SUBSCRIBERS (EMAILS VARCHAR);
         INSERT INTO SUBSCRIBERS VALUES ('admin@x.com,b@x.com,');",
    );
    let admin = identity(
        IdentityRequest::new("admin")
            .with_pseudonym("anon1")
            .with_email("admin@x.com"),
    );

    fixture.run(
        &admin,
        vec![
            TableEntryDescriptor::new("SUBSCRIBERS", "EMAILS")
                .with_column_type(ColumnType::Email)
                .with_text_replace("", ","),
        ],
    );

    assert_eq!(
        fixture.strings("SELECT EMAILS FROM SUBSCRIBERS"),
        vec!["anon1,b@x.com,"]
    );
}

#[test]
fn ip_and_username_columns_update_together() {
    let fixture = Fixture::new(
        "CREATE TABLE API_REQ_USER_LOC (USER_IP VARCHAR, IP_USER VARCHAR);
         INSERT INTO API_REQ_USER_LOC VALUES
            ('10.0.0.5', 'admin@carbon.super'),
            ('10.0.0.5', 'bob@carbon.super');",
    );
    let admin = identity(
        IdentityRequest::new("admin")
            .with_pseudonym("anon1")
            .with_ip(Ipv4Addr::new(10, 0, 0, 5)),
    )
    .with_ip_pseudonym(Ipv4Addr::new(10, 0, 0, 9));

    let report = fixture.run(
        &admin,
        vec![
            TableEntryDescriptor::new("API_REQ_USER_LOC", "USER_IP")
                .with_column_type(ColumnType::Ip)
                .with_ip_username_column("IP_USER"),
        ],
    );

    assert_eq!(
        report.databases[0].entries[0].outcome,
        EntryOutcome::Rewritten {
            scenario: RewriteScenario::IpAndUsernameColumns,
            rows: 1
        }
    );
    assert_eq!(
        fixture.strings(
            "SELECT USER_IP || '|' || IP_USER FROM API_REQ_USER_LOC ORDER BY IP_USER"
        ),
        vec!["10.0.0.9|anon1@carbon.super", "10.0.0.5|bob@carbon.super"]
    );
}

#[test]
fn ip_columns_without_ip_leave_ip_untouched() {
    let fixture = Fixture::new(
        "CREATE TABLE API_REQ_USER_LOC (USER_IP VARCHAR, IP_USER VARCHAR);
         INSERT INTO API_REQ_USER_LOC VALUES ('10.0.0.5', 'admin@carbon.super');",
    );

    fixture.run(
        &admin(),
        vec![
            TableEntryDescriptor::new("API_REQ_USER_LOC", "USER_IP")
                .with_column_type(ColumnType::Ip)
                .with_ip_username_column("IP_USER"),
        ],
    );

    assert_eq!(
        fixture.strings("SELECT USER_IP || '|' || IP_USER FROM API_REQ_USER_LOC"),
        vec!["10.0.0.5|anon1@carbon.super"]
    );
}

#[test]
fn ip_and_username_in_text_are_replaced() {
    let fixture = Fixture::new(
        "CREATE TABLE AUDIT (ENTRY VARCHAR);
         INSERT INTO AUDIT VALUES ('login from 10.0.0.5 by [admin@carbon.super]');",
    );
    let admin = identity(
        IdentityRequest::new("admin")
            .with_pseudonym("anon1")
            .with_ip(Ipv4Addr::new(10, 0, 0, 5)),
    )
    .with_ip_pseudonym(Ipv4Addr::new(10, 0, 0, 9));

    fixture.run(
        &admin,
        vec![
            TableEntryDescriptor::new("AUDIT", "ENTRY")
                .with_column_type(ColumnType::Ip)
                .with_text_replace("[", "]")
                .with_ip_delimiters("from ", " by"),
        ],
    );

    assert_eq!(
        fixture.strings("SELECT ENTRY FROM AUDIT"),
        vec!["login from 10.0.0.9 by [anon1@carbon.super]"]
    );
}

#[test]
fn ip_in_text_leaves_addresses_sharing_a_prefix() {
    let fixture = Fixture::new(
        "CREATE TABLE AUDIT (ENTRY VARCHAR);
         INSERT INTO AUDIT VALUES
            ('login from 10.0.0.5 by [admin@carbon.super]'),
            ('login from 10.0.0.50 by [bob@carbon.super]'),
            ('login from 110.0.0.5 by [carol@carbon.super]');",
    );
    let admin = identity(
        IdentityRequest::new("admin")
            .with_pseudonym("anon1")
            .with_ip(Ipv4Addr::new(10, 0, 0, 5)),
    )
    .with_ip_pseudonym(Ipv4Addr::new(10, 0, 0, 9));

    let report = fixture.run(
        &admin,
        vec![
            TableEntryDescriptor::new("AUDIT", "ENTRY")
                .with_column_type(ColumnType::Ip)
                .with_text_replace("[", "]")
                .with_ip_delimiters("from ", " by"),
        ],
    );

    assert_eq!(report.rows_rewritten(), 1);
    assert_eq!(
        fixture.strings("SELECT ENTRY FROM AUDIT ORDER BY ENTRY"),
        vec![
            "login from 10.0.0.50 by [bob@carbon.super]",
            "login from 10.0.0.9 by [anon1@carbon.super]",
            "login from 110.0.0.5 by [carol@carbon.super]",
        ]
    );
}

#[test]
fn ip_columns_rewrite_every_row_of_the_user() {
    let fixture = Fixture::new(
        "CREATE TABLE API_REQ_USER_LOC (USER_IP VARCHAR, IP_USER VARCHAR);
         INSERT INTO API_REQ_USER_LOC VALUES
            ('10.0.0.5', 'admin@carbon.super'),
            ('10.0.0.7', 'admin@carbon.super'),
            ('10.0.0.5', 'bob@carbon.super');",
    );
    let admin = identity(
        IdentityRequest::new("admin")
            .with_pseudonym("anon1")
            .with_ip(Ipv4Addr::new(10, 0, 0, 5)),
    )
    .with_ip_pseudonym(Ipv4Addr::new(10, 0, 0, 9));

    let report = fixture.run(
        &admin,
        vec![
            TableEntryDescriptor::new("API_REQ_USER_LOC", "USER_IP")
                .with_column_type(ColumnType::Ip)
                .with_ip_username_column("IP_USER"),
        ],
    );

    assert_eq!(report.rows_rewritten(), 2);
    assert_eq!(
        fixture.strings(
            "SELECT USER_IP || '|' || IP_USER FROM API_REQ_USER_LOC ORDER BY USER_IP, IP_USER"
        ),
        vec![
            "10.0.0.5|bob@carbon.super",
            "10.0.0.7|anon1@carbon.super",
            "10.0.0.9|anon1@carbon.super",
        ]
    );
}

#[test]
fn super_tenant_username_in_text_is_replaced() {
    let fixture = Fixture::new(
        "CREATE TABLE ALERT_LOG (MESSAGE VARCHAR);
         INSERT INTO ALERT_LOG VALUES
            ('throttled user=admin@carbon.super; api=pizza'),
            ('throttled user=admin; api=pizza');",
    );

    let report = fixture.run(
        &admin(),
        vec![
            TableEntryDescriptor::new("ALERT_LOG", "MESSAGE")
                .with_text_replace("user=", ";")
                .with_super_tenant_domain(true),
        ],
    );

    assert_eq!(
        report.databases[0].entries[0].outcome,
        EntryOutcome::Rewritten {
            scenario: RewriteScenario::SuperTenantTextUsername,
            rows: 1
        }
    );
    assert_eq!(
        fixture.strings("SELECT MESSAGE FROM ALERT_LOG ORDER BY MESSAGE"),
        vec![
            "throttled user=admin; api=pizza",
            "throttled user=anon1@carbon.super; api=pizza",
        ]
    );
}

#[test]
fn like_wildcards_in_usernames_match_literally() {
    let fixture = Fixture::new(
        "CREATE TABLE ALERT_LOG (MESSAGE VARCHAR);
         INSERT INTO ALERT_LOG VALUES
            ('user=a_b@carbon.super;'),
            ('user=axb@carbon.super;'),
            ('user=a%@carbon.super;');",
    );
    let user = identity(IdentityRequest::new("a_b").with_pseudonym("p1"));

    let report = fixture.run(
        &user,
        vec![
            TableEntryDescriptor::new("ALERT_LOG", "MESSAGE")
                .with_text_replace("user=", ";")
                .with_super_tenant_domain(true),
        ],
    );

    assert_eq!(report.rows_rewritten(), 1);
    assert_eq!(
        fixture.strings("SELECT MESSAGE FROM ALERT_LOG ORDER BY MESSAGE"),
        vec![
            "user=a%@carbon.super;",
            "user=axb@carbon.super;",
            "user=p1@carbon.super;",
        ]
    );
}

#[test]
fn backslashes_in_usernames_are_kept_literally() {
    let fixture = Fixture::new(
        r"CREATE TABLE USERS (NAME VARCHAR);
          INSERT INTO USERS VALUES ('CORPdmin'), ('CORPadmin');",
    );
    let user = identity(IdentityRequest::new(r"CORPdmin").with_pseudonym("p1"));

    let report = fixture.run(&user, vec![TableEntryDescriptor::new("USERS", "NAME")]);

    assert_eq!(report.rows_rewritten(), 1);
    assert_eq!(
        fixture.strings("SELECT NAME FROM USERS ORDER BY NAME"),
        vec!["CORPadmin", "p1"]
    );
}

#[test]
fn missing_table_is_skipped() {
    let fixture = Fixture::new("CREATE TABLE USERS (NAME VARCHAR); INSERT INTO USERS VALUES ('admin');");

    let report = fixture.run(
        &admin(),
        vec![
            TableEntryDescriptor::new("NOT_THERE", "NAME"),
            TableEntryDescriptor::new("USERS", "NAME"),
        ],
    );

    let entries = &report.databases[0].entries;
    assert_eq!(entries[0].outcome, EntryOutcome::TableMissing);
    assert_eq!(report.entries_rewritten(), 1);
    assert_eq!(fixture.strings("SELECT NAME FROM USERS"), vec!["anon1"]);
}

#[test]
fn tenant_domain_column_limits_rows() {
    let fixture = Fixture::new(
        "CREATE TABLE SUBSCRIPTIONS (SUBSCRIBER VARCHAR, TENANT VARCHAR);
         INSERT INTO SUBSCRIPTIONS VALUES
            ('alice@wso2.com', 'wso2.com'),
            ('alice@wso2.com', 'other.org');",
    );
    let alice = identity(
        IdentityRequest::new("alice")
            .with_pseudonym("p1")
            .with_tenant_domain("wso2.com"),
    );

    fixture.run(
        &alice,
        vec![TableEntryDescriptor::new("SUBSCRIPTIONS", "SUBSCRIBER").with_tenant_domain_column("TENANT")],
    );

    assert_eq!(
        fixture.strings("SELECT SUBSCRIBER || '|' || TENANT FROM SUBSCRIPTIONS ORDER BY TENANT"),
        vec!["alice@wso2.com|other.org", "p1@wso2.com|wso2.com"]
    );
}

#[test]
fn override_file_replaces_builtin_query() {
    let fixture = Fixture::new(
        "CREATE TABLE USERS (NAME VARCHAR, NOTE VARCHAR);
         INSERT INTO USERS VALUES ('admin', NULL);",
    );
    let overrides: QueryCatalog = toml::from_str(
        r#"
[[dialects]]
product = "DuckDB"
version = "default"

[dialects.queries]
UPDATE_USERNAME = "UPDATE {{TABLE_NAME}} SET {{USERNAME_COLUMN_NAME}} = '{{PSEUDONYM_USERNAME_VALUE}}', NOTE = 'pseudonymized' WHERE {{USERNAME_COLUMN_NAME}} = '{{CURRENT_USERNAME_VALUE}}'"
"#,
    )
    .unwrap();
    let identity = admin();
    let databases = vec![DatabaseDescriptor::new(DB, vec![TableEntryDescriptor::new("USERS", "NAME")])];

    Executor::new(&identity, &fixture.registry, &databases)
        .with_overrides(overrides)
        .run()
        .unwrap();

    assert_eq!(
        fixture.strings("SELECT NAME || '|' || NOTE FROM USERS"),
        vec!["anon1|pseudonymized"]
    );
}

#[test]
fn hashed_pseudonym_is_stable_across_runs() {
    let settings = PseudonymSettings {
        hash_usernames: true,
        ..PseudonymSettings::default()
    };
    let first = Identity::resolve(IdentityRequest::new("admin"), &settings).unwrap();
    let second = Identity::resolve(IdentityRequest::new("admin"), &settings).unwrap();
    assert_eq!(first.pseudonym(), second.pseudonym());

    let fixture = Fixture::new("CREATE TABLE USERS (NAME VARCHAR); INSERT INTO USERS VALUES ('admin');");
    fixture.run(&first, vec![TableEntryDescriptor::new("USERS", "NAME")]);
    assert_eq!(
        fixture.strings("SELECT NAME FROM USERS"),
        vec![first.pseudonym().to_string()]
    );
}

#[test]
fn unmatched_database_is_reported() {
    let fixture = Fixture::new("CREATE TABLE USERS (NAME VARCHAR);");
    let identity = admin();
    let databases = vec![
        DatabaseDescriptor::new("WSO2AM_DB", vec![TableEntryDescriptor::new("USERS", "NAME")]),
        DatabaseDescriptor::new(DB.to_lowercase(), vec![TableEntryDescriptor::new("USERS", "NAME")]),
    ];

    let report = Executor::new(&identity, &fixture.registry, &databases).run().unwrap();

    assert_eq!(report.databases[0].outcome, DatabaseOutcome::Unmatched);
    assert_eq!(report.databases[1].outcome, DatabaseOutcome::Completed);
    assert_eq!(report.databases[1].product.as_deref(), Some("DuckDB"));
}
