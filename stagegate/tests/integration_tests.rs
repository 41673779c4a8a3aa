use chrono::Utc;
use stagegate::{
    Decision, DefinitionId, DefinitionStatus, DefinitionStoreBackend, FileSystemProjectStore,
    GroupId, MemoryDefinitionStore, NewDefinition, NewProject, NewVersion, ProcessDefinition,
    ProcessDefinitionVersion, ProcessId, ProjectStatus, SendBackTarget, StepDirectory, VersionId,
    WorkflowService,
};
use tempfile::TempDir;

const SAMPLE_DOCUMENT: &str = r#"
processes:
  - id: DesignEntitlement
    name: Design & Entitlement
    nodes:
      - { id: start, kind: start }
      - { id: WFG1_CallActivity, kind: call-activity, name: Project Kickoff, calls: WFG1_ProjectKickoff }
      - { id: gw1, kind: gateway }
      - { id: WFG2_CallActivity, kind: call-activity, name: Schematic Design, calls: WFG2_SchematicDesign }
      - { id: gw2, kind: gateway }
      - { id: WFG3_CallActivity, kind: call-activity, name: Construction Docs, calls: WFG3_ConstructionDocs }
      - { id: gw3, kind: gateway }
      - { id: end, kind: end }
    flows:
      - { from: start, to: WFG1_CallActivity }
      - { from: WFG1_CallActivity, to: gw1 }
      - { from: gw1, to: WFG3_CallActivity, when: { action: skip_to, target_group: WFG3 } }
      - { from: gw1, to: WFG2_CallActivity }
      - { from: WFG2_CallActivity, to: gw2 }
      - { from: gw2, to: WFG1_CallActivity, when: { action: send_back, target_group: WFG1 } }
      - { from: gw2, to: WFG3_CallActivity }
      - { from: WFG3_CallActivity, to: gw3 }
      - { from: gw3, to: WFG2_CallActivity, when: { action: send_back, target_group: WFG2 } }
      - { from: gw3, to: end }
  - id: WFG1_ProjectKickoff
    nodes:
      - { id: start, kind: start }
      - { id: WFG1_WFI1, kind: user-task, name: Initial Project Review }
      - { id: gw_wfi1, kind: gateway }
      - { id: WFG1_WFI2, kind: user-task, name: Kickoff Meeting }
      - { id: gw_wfi2, kind: gateway }
      - { id: end, kind: end }
    flows:
      - { from: start, to: WFG1_WFI1 }
      - { from: WFG1_WFI1, to: gw_wfi1 }
      - { from: gw_wfi1, to: end, when: { action: skip_to } }
      - { from: gw_wfi1, to: end, when: { action: complete_wfg } }
      - { from: gw_wfi1, to: WFG1_WFI2 }
      - { from: WFG1_WFI2, to: gw_wfi2 }
      - { from: gw_wfi2, to: WFG1_WFI1, when: { action: send_back, target_item: WFI1 } }
      - { from: gw_wfi2, to: WFG1_WFI2, when: { action: send_back, target_item: WFI2 } }
      - { from: gw_wfi2, to: end }
  - id: WFG2_SchematicDesign
    nodes:
      - { id: start, kind: start }
      - { id: WFG2_WFI1, kind: user-task, name: Design Development }
      - { id: gw_wfi1, kind: gateway }
      - { id: WFG2_WFI2, kind: user-task, name: Design Review }
      - { id: gw_wfi2, kind: gateway }
      - { id: end, kind: end }
    flows:
      - { from: start, to: WFG2_WFI1 }
      - { from: WFG2_WFI1, to: gw_wfi1 }
      - { from: gw_wfi1, to: WFG2_WFI1, when: { action: send_back, target_item: WFI1 } }
      - { from: gw_wfi1, to: end, when: { action: send_back } }
      - { from: gw_wfi1, to: end, when: { action: complete_wfg } }
      - { from: gw_wfi1, to: WFG2_WFI2 }
      - { from: WFG2_WFI2, to: gw_wfi2 }
      - { from: gw_wfi2, to: WFG2_WFI1, when: { action: send_back, target_item: WFI1 } }
      - { from: gw_wfi2, to: WFG2_WFI2, when: { action: send_back, target_item: WFI2 } }
      - { from: gw_wfi2, to: end, when: { action: send_back } }
      - { from: gw_wfi2, to: end }
  - id: WFG3_ConstructionDocs
    nodes:
      - { id: start, kind: start }
      - { id: WFG3_WFI1, kind: user-task, name: Final Documentation }
      - { id: gw_wfi1, kind: gateway }
      - { id: end, kind: end }
    flows:
      - { from: start, to: WFG3_WFI1 }
      - { from: WFG3_WFI1, to: gw_wfi1 }
      - { from: gw_wfi1, to: WFG3_WFI1, when: { action: send_back, target_item: WFI1 } }
      - { from: gw_wfi1, to: end, when: { action: send_back } }
      - { from: gw_wfi1, to: end }
"#;

fn published_service() -> (WorkflowService, DefinitionId) {
    let mut service = WorkflowService::in_memory(StepDirectory::standard());
    let definition = service
        .create_definition(NewDefinition {
            name: "Design & Entitlement POC".to_string(),
            description: Some("Three-group design workflow".to_string()),
            process_id: ProcessId::new("DesignEntitlement"),
            document: SAMPLE_DOCUMENT.to_string(),
            change_notes: None,
            created_by: "system".to_string(),
        })
        .unwrap();
    service.publish_version(definition.id, 1).unwrap();
    (service, definition.id)
}

fn new_project(definition_id: DefinitionId) -> NewProject {
    NewProject {
        name: "Lakeside Development".to_string(),
        description: Some("Mixed-use lakeside project".to_string()),
        definition_id: Some(definition_id),
        created_by: "system".to_string(),
    }
}

#[test]
fn test_full_workflow_through_public_api() {
    let (mut service, definition_id) = published_service();
    let project = service.instantiate_project(new_project(definition_id)).unwrap();
    assert_eq!(project.position.as_ref().unwrap().to_string(), "WFG1/WFI1");

    // Approve through the first group into the second.
    let outcome = service.decide(project.id, Decision::Approve, "reviewer").unwrap();
    assert_eq!(outcome.new_position.unwrap().to_string(), "WFG1/WFI2");
    let outcome = service.decide(project.id, Decision::Approve, "reviewer").unwrap();
    assert_eq!(outcome.new_position.unwrap().to_string(), "WFG2/WFI1");

    // Send back to the first group with a reason, then approve everything.
    let outcome = service
        .decide(
            project.id,
            Decision::SendBack {
                target: SendBackTarget::Group(GroupId::new("WFG1")),
                reason: "missing docs".to_string(),
            },
            "reviewer",
        )
        .unwrap();
    assert_eq!(outcome.new_position.unwrap().to_string(), "WFG1/WFI1");

    let mut last = service.decide(project.id, Decision::Approve, "reviewer").unwrap();
    while !last.completed {
        last = service.decide(project.id, Decision::Approve, "reviewer").unwrap();
    }
    assert!(last.new_position.unwrap().is_end());

    let project = service.project(project.id).unwrap();
    assert_eq!(project.status, ProjectStatus::Completed);

    // One entry per decision plus the instantiation record.
    let history = service.history(project.id).unwrap();
    assert_eq!(history.len(), 9);
    assert!(history
        .iter()
        .any(|entry| entry.reason.as_deref() == Some("missing docs")));
}

#[test]
fn test_execution_resumes_across_service_restarts() {
    let dir = TempDir::new().unwrap();
    let (definitions, definition_id) = published_definition_store();

    let project_id = {
        let mut service = WorkflowService::new(
            Box::new(definitions.clone()),
            Box::new(FileSystemProjectStore::new(dir.path()).unwrap()),
            StepDirectory::standard(),
        );
        let project = service.instantiate_project(new_project(definition_id)).unwrap();
        service.decide(project.id, Decision::Approve, "reviewer").unwrap();
        project.id
    };

    // A fresh service over the same directory picks up the persisted
    // cursor and continues exactly where the previous one stopped.
    let mut service = WorkflowService::new(
        Box::new(definitions.clone()),
        Box::new(FileSystemProjectStore::new(dir.path()).unwrap()),
        StepDirectory::standard(),
    );
    let reloaded = service.project(project_id).unwrap();
    assert_eq!(reloaded.position.as_ref().unwrap().to_string(), "WFG1/WFI2");

    let outcome = service.decide(project_id, Decision::Approve, "reviewer").unwrap();
    assert_eq!(outcome.new_position.as_ref().unwrap().to_string(), "WFG2/WFI1");

    let mut last = outcome;
    while !last.completed {
        last = service.decide(project_id, Decision::Approve, "reviewer").unwrap();
    }
    assert_eq!(service.project(project_id).unwrap().status, ProjectStatus::Completed);
    assert_eq!(service.history(project_id).unwrap().len(), 6);
}

#[test]
fn test_version_lifecycle_through_public_api() {
    let (mut service, definition_id) = published_service();

    let draft = service
        .create_version(
            definition_id,
            NewVersion {
                document: SAMPLE_DOCUMENT.to_string(),
                change_notes: Some("draft tweaks".to_string()),
                publish: false,
                created_by: "system".to_string(),
            },
        )
        .unwrap();
    assert_eq!(draft.version, 2);
    assert_eq!(service.active_version(definition_id).unwrap().version, 1);

    service
        .create_version(
            definition_id,
            NewVersion {
                document: SAMPLE_DOCUMENT.to_string(),
                change_notes: Some("v3".to_string()),
                publish: true,
                created_by: "system".to_string(),
            },
        )
        .unwrap();
    assert_eq!(service.active_version(definition_id).unwrap().version, 3);

    let rolled = service.rollback_to_version(definition_id, 1, "system").unwrap();
    assert_eq!(rolled.version, 4);
    assert!(rolled.is_active);

    // Exactly one version is active after any publish or rollback.
    let active: Vec<u32> = service
        .versions(definition_id)
        .unwrap()
        .iter()
        .filter(|v| v.is_active)
        .map(|v| v.version)
        .collect();
    assert_eq!(active, vec![4]);
}

#[test]
fn test_validate_document_without_saving() {
    let (service, _) = published_service();

    let validation = service.validate_document(SAMPLE_DOCUMENT, Some("DesignEntitlement"));
    assert!(validation.valid);
    assert_eq!(validation.discovered_process_ids.len(), 4);

    let validation = service.validate_document("processes: [oops", None);
    assert!(!validation.valid);
    assert!(!validation.errors.is_empty());
}

/// A definition store published by hand through the backend trait, so it
/// can be shared across independently constructed services.
fn published_definition_store() -> (MemoryDefinitionStore, DefinitionId) {
    let mut store = MemoryDefinitionStore::new();
    let now = Utc::now();
    let definition = ProcessDefinition {
        id: DefinitionId::new(),
        name: "Design & Entitlement POC".to_string(),
        description: None,
        process_id: ProcessId::new("DesignEntitlement"),
        status: DefinitionStatus::Published,
        created_by: "system".to_string(),
        created_at: now,
        updated_at: now,
    };
    store.insert_definition(definition.clone()).unwrap();
    store
        .insert_version(ProcessDefinitionVersion {
            id: VersionId::new(),
            definition_id: definition.id,
            version: 1,
            document: SAMPLE_DOCUMENT.to_string(),
            change_notes: None,
            is_active: false,
            created_by: "system".to_string(),
            created_at: now,
        })
        .unwrap();
    store.set_active_version(definition.id, 1).unwrap();
    (store, definition.id)
}
